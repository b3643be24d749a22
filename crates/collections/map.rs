//! Persistent unordered map: a hash-array-mapped trie.
//!
//! Branches keep a 32-bit occupancy bitmap and store children packed in
//! population-count order. Keys hash to 32 bits consumed 5 bits per level;
//! two keys sharing the whole hash end up in a collision bucket. Branches
//! stamped by the active session are patched in place; leaves and collision
//! buckets are small and churn rarely, so they are replaced wholesale.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::bits::{BITS, hash_index};
use crate::hash::Hash32;
use crate::owner::Owner;

pub struct PMap<K, V> {
    size: usize,
    root: Option<Arc<MapNode<K, V>>>,
}

#[derive(Debug, Clone)]
enum MapNode<K, V> {
    Leaf(LeafEntry<K, V>),
    Collision(CollisionNode<K, V>),
    Branch(BranchNode<K, V>),
}

#[derive(Debug, Clone)]
struct LeafEntry<K, V> {
    hash: u32,
    key: K,
    value: V,
}

/// Bucket of entries whose keys share the entire 32-bit hash.
#[derive(Debug, Clone)]
struct CollisionNode<K, V> {
    hash: u32,
    entries: SmallVec<[(K, V); 2]>,
}

#[derive(Debug, Clone)]
struct BranchNode<K, V> {
    owner: Option<Owner>,
    bitmap: u32,
    /// Present children, packed in ascending index-bit order.
    children: Vec<Arc<MapNode<K, V>>>,
}

impl<K, V> MapNode<K, V> {
    fn owner(&self) -> Option<Owner> {
        match self {
            MapNode::Branch(b) => b.owner,
            _ => None,
        }
    }

    fn is_branch(&self) -> bool {
        matches!(self, MapNode::Branch(_))
    }
}

fn make_editable<K: Clone, V: Clone>(
    arc: &mut Arc<MapNode<K, V>>,
    owner: Owner,
) -> &mut MapNode<K, V> {
    if arc.owner() != Some(owner) {
        let mut copy = (**arc).clone();
        if let MapNode::Branch(branch) = &mut copy {
            branch.owner = Some(owner);
        }
        *arc = Arc::new(copy);
    }
    Arc::make_mut(arc)
}

impl<K, V> PMap<K, V> {
    pub fn new() -> Self {
        PMap {
            size: 0,
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn iter(&self) -> MapIter<'_, K, V> {
        MapIter {
            stack: match &self.root {
                Some(root) => vec![root.as_ref()],
                None => Vec::new(),
            },
            collision: [].iter(),
        }
    }

    /// Same backing trie, i.e. no edit happened between the two versions.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.size == other.size
            && match (&self.root, &other.root) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

impl<K: Hash32 + Eq, V> PMap<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = key.hash32();
        let mut node = self.root.as_ref()?;
        let mut shift = 0u32;
        loop {
            match &**node {
                MapNode::Leaf(leaf) => {
                    return (leaf.hash == hash && leaf.key == *key).then(|| &leaf.value);
                }
                MapNode::Collision(c) => {
                    return if c.hash == hash {
                        c.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
                    } else {
                        None
                    };
                }
                MapNode::Branch(branch) => {
                    let bit = 1u32 << hash_index(hash, shift);
                    if branch.bitmap & bit == 0 {
                        return None;
                    }
                    let pos = (branch.bitmap & (bit - 1)).count_ones() as usize;
                    node = &branch.children[pos];
                    shift += BITS as u32;
                }
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K: Hash32 + Eq + Clone, V: Clone> PMap<K, V> {
    /// Insert or update, returning the displaced value.
    pub fn insert(&mut self, owner: Owner, key: K, value: V) -> Option<V> {
        let hash = key.hash32();
        let old = match &mut self.root {
            None => {
                self.root = Some(Arc::new(MapNode::Leaf(LeafEntry { hash, key, value })));
                None
            }
            Some(root) => insert_node(root, 0, hash, key, value, owner),
        };
        if old.is_none() {
            self.size += 1;
        }
        old
    }

    /// Remove `key`, returning its value. An absent key leaves the map
    /// untouched: no node is copied.
    pub fn remove(&mut self, owner: Owner, key: &K) -> Option<V> {
        if !self.contains_key(key) {
            return None;
        }
        let hash = key.hash32();
        let root = self.root.as_mut()?;
        match remove_node(root, 0, hash, key, owner) {
            Rm::Drop(value) => {
                self.root = None;
                self.size -= 1;
                Some(value)
            }
            Rm::Kept(value) => {
                self.size -= 1;
                Some(value)
            }
            Rm::Miss => {
                debug_assert!(false, "pre-checked key vanished during removal");
                None
            }
        }
    }
}

fn insert_node<K: Hash32 + Eq + Clone, V: Clone>(
    arc: &mut Arc<MapNode<K, V>>,
    shift: u32,
    hash: u32,
    key: K,
    value: V,
    owner: Owner,
) -> Option<V> {
    if arc.is_branch() {
        let MapNode::Branch(branch) = make_editable(arc, owner) else {
            debug_assert!(false, "branch changed kind under edit");
            return None;
        };
        let bit = 1u32 << hash_index(hash, shift);
        let pos = (branch.bitmap & (bit - 1)).count_ones() as usize;
        if branch.bitmap & bit == 0 {
            branch.bitmap |= bit;
            branch
                .children
                .insert(pos, Arc::new(MapNode::Leaf(LeafEntry { hash, key, value })));
            return None;
        }
        return insert_node(
            &mut branch.children[pos],
            shift + BITS as u32,
            hash,
            key,
            value,
            owner,
        );
    }
    // Leaves and collision buckets are replaced, never edited.
    let (replacement, old) = match &**arc {
        MapNode::Leaf(leaf) => {
            if leaf.hash == hash && leaf.key == key {
                (
                    Arc::new(MapNode::Leaf(LeafEntry { hash, key, value })),
                    Some(leaf.value.clone()),
                )
            } else if leaf.hash == hash {
                let mut entries: SmallVec<[(K, V); 2]> = SmallVec::new();
                entries.push((leaf.key.clone(), leaf.value.clone()));
                entries.push((key, value));
                (
                    Arc::new(MapNode::Collision(CollisionNode { hash, entries })),
                    None,
                )
            } else {
                let new_leaf = Arc::new(MapNode::Leaf(LeafEntry { hash, key, value }));
                (split(arc.clone(), leaf.hash, new_leaf, hash, shift, owner), None)
            }
        }
        MapNode::Collision(c) => {
            if c.hash == hash {
                let mut entries = c.entries.clone();
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => {
                        let old = entry.1.clone();
                        entry.1 = value;
                        (
                            Arc::new(MapNode::Collision(CollisionNode { hash, entries })),
                            Some(old),
                        )
                    }
                    None => {
                        entries.push((key, value));
                        (
                            Arc::new(MapNode::Collision(CollisionNode { hash, entries })),
                            None,
                        )
                    }
                }
            } else {
                let new_leaf = Arc::new(MapNode::Leaf(LeafEntry { hash, key, value }));
                (split(arc.clone(), c.hash, new_leaf, hash, shift, owner), None)
            }
        }
        MapNode::Branch(_) => {
            debug_assert!(false, "branch fell through the in-place path");
            return None;
        }
    };
    *arc = replacement;
    old
}

/// Build the branch spine separating two nodes whose hashes diverge at or
/// below `shift`.
fn split<K, V>(
    a: Arc<MapNode<K, V>>,
    a_hash: u32,
    b: Arc<MapNode<K, V>>,
    b_hash: u32,
    shift: u32,
    owner: Owner,
) -> Arc<MapNode<K, V>> {
    debug_assert!(shift < u32::BITS, "split past the hash width");
    let ia = hash_index(a_hash, shift);
    let ib = hash_index(b_hash, shift);
    if ia == ib {
        let child = split(a, a_hash, b, b_hash, shift + BITS as u32, owner);
        Arc::new(MapNode::Branch(BranchNode {
            owner: Some(owner),
            bitmap: 1 << ia,
            children: vec![child],
        }))
    } else {
        let (children, bitmap) = if ia < ib {
            (vec![a, b], 1 << ia | 1 << ib)
        } else {
            (vec![b, a], 1 << ia | 1 << ib)
        };
        Arc::new(MapNode::Branch(BranchNode {
            owner: Some(owner),
            bitmap,
            children,
        }))
    }
}

enum Rm<V> {
    Miss,
    /// The node vanished; the parent must clear its slot.
    Drop(V),
    /// The node was mutated or replaced in place.
    Kept(V),
}

fn remove_node<K: Hash32 + Eq + Clone, V: Clone>(
    arc: &mut Arc<MapNode<K, V>>,
    shift: u32,
    hash: u32,
    key: &K,
    owner: Owner,
) -> Rm<V> {
    if arc.is_branch() {
        let bit = 1u32 << hash_index(hash, shift);
        {
            // reject before cloning the path
            let MapNode::Branch(branch) = &**arc else {
                return Rm::Miss;
            };
            if branch.bitmap & bit == 0 {
                return Rm::Miss;
            }
        }
        let result;
        let mut collapse = None;
        {
            let MapNode::Branch(branch) = make_editable(arc, owner) else {
                debug_assert!(false, "branch changed kind under edit");
                return Rm::Miss;
            };
            let pos = (branch.bitmap & (bit - 1)).count_ones() as usize;
            match remove_node(&mut branch.children[pos], shift + BITS as u32, hash, key, owner) {
                Rm::Miss => return Rm::Miss,
                Rm::Drop(value) => {
                    branch.bitmap &= !bit;
                    branch.children.remove(pos);
                    if branch.children.is_empty() {
                        return Rm::Drop(value);
                    }
                    result = Rm::Kept(value);
                }
                Rm::Kept(value) => result = Rm::Kept(value),
            }
            // A lone non-branch child merges upward; a branch child must stay
            // at its depth or its hash prefix would no longer reach it.
            if branch.children.len() == 1 && !branch.children[0].is_branch() {
                collapse = Some(branch.children[0].clone());
            }
        }
        if let Some(child) = collapse {
            *arc = child;
        }
        return result;
    }
    let (replacement, result) = match &**arc {
        MapNode::Leaf(leaf) => {
            if leaf.hash == hash && leaf.key == *key {
                return Rm::Drop(leaf.value.clone());
            }
            (None, Rm::Miss)
        }
        MapNode::Collision(c) => {
            if c.hash != hash {
                (None, Rm::Miss)
            } else {
                match c.entries.iter().position(|(k, _)| k == key) {
                    None => (None, Rm::Miss),
                    Some(pos) => {
                        let removed = c.entries[pos].1.clone();
                        let node = if c.entries.len() == 2 {
                            let (k, v) = c.entries[1 - pos].clone();
                            MapNode::Leaf(LeafEntry {
                                hash,
                                key: k,
                                value: v,
                            })
                        } else {
                            let mut entries = c.entries.clone();
                            entries.remove(pos);
                            MapNode::Collision(CollisionNode { hash, entries })
                        };
                        (Some(Arc::new(node)), Rm::Kept(removed))
                    }
                }
            }
        }
        MapNode::Branch(_) => {
            debug_assert!(false, "branch fell through the in-place path");
            (None, Rm::Miss)
        }
    };
    if let Some(node) = replacement {
        *arc = node;
    }
    result
}

pub struct MapIter<'a, K, V> {
    // children of visited branches are stacked in reverse, so the run is a
    // plain depth-first walk without a per-node cursor
    stack: Vec<&'a MapNode<K, V>>,
    collision: std::slice::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for MapIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((k, v)) = self.collision.next() {
            return Some((k, v));
        }
        loop {
            let node = self.stack.pop()?;
            match node {
                MapNode::Leaf(leaf) => return Some((&leaf.key, &leaf.value)),
                MapNode::Collision(c) => {
                    self.collision = c.entries.iter();
                    if let Some((k, v)) = self.collision.next() {
                        return Some((k, v));
                    }
                }
                MapNode::Branch(branch) => {
                    for child in branch.children.iter().rev() {
                        self.stack.push(child);
                    }
                }
            }
        }
    }
}

impl<K, V> Clone for PMap<K, V> {
    fn clone(&self) -> Self {
        PMap {
            size: self.size,
            root: self.root.clone(),
        }
    }
}

impl<K, V> Default for PMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for PMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Hash32 + Eq, V: PartialEq> PartialEq for PMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Hash32 + Eq, V: Eq> Eq for PMap<K, V> {}

impl<K: Hash32 + Eq + Clone, V: Clone> FromIterator<(K, V)> for PMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let owner = Owner::new();
        let mut map = PMap::new();
        for (k, v) in iter {
            map.insert(owner, k, v);
        }
        map
    }
}
