//! Insertion-ordered map and set.
//!
//! An append-only slot log shadows the hash trie: every first insertion of a
//! key claims the next slot, removals tombstone their slot, and iteration
//! walks the log skipping tombstones. When more than half the slots are
//! tombstones (and the log is past its infancy) the index is rebuilt with
//! the holes squeezed out and slots renumbered.

use tracing::trace;

use crate::hash::Hash32;
use crate::map::PMap;
use crate::owner::Owner;
use crate::vec::{Iter as VecIter, PVec};

/// Compaction never triggers below this slot count.
const COMPACT_MIN_SLOTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot<T> {
    Live(T),
    Deleted,
}

pub struct OrdMap<K, V> {
    /// Next slot to assign; equals the log length.
    next: usize,
    /// Tombstoned slots.
    holes: usize,
    key_to_idx: PMap<K, usize>,
    idx_to_key: PVec<Slot<K>>,
    idx_to_val: PVec<Slot<V>>,
}

impl<K, V> OrdMap<K, V> {
    pub fn new() -> Self {
        OrdMap {
            next: 0,
            holes: 0,
            key_to_idx: PMap::new(),
            idx_to_key: PVec::new(),
            idx_to_val: PVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.key_to_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_to_idx.is_empty()
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> OrdMapIter<'_, K, V> {
        OrdMapIter {
            keys: self.idx_to_key.iter(),
            vals: self.idx_to_val.iter(),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.next == other.next
            && self.holes == other.holes
            && self.key_to_idx.ptr_eq(&other.key_to_idx)
            && self.idx_to_key.ptr_eq(&other.idx_to_key)
            && self.idx_to_val.ptr_eq(&other.idx_to_val)
    }

    /// Address of the backing allocation; stable across clones of the same
    /// version.
    pub fn heap_id(&self) -> usize {
        self.idx_to_key.heap_id()
    }
}

impl<K: Hash32 + Eq, V> OrdMap<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        let idx = *self.key_to_idx.get(key)?;
        match self.idx_to_val.get(idx) {
            Some(Slot::Live(value)) => Some(value),
            _ => {
                debug_assert!(false, "live key maps to a tombstoned slot");
                None
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.key_to_idx.contains_key(key)
    }
}

impl<K: Hash32 + Eq + Clone, V: Clone> OrdMap<K, V> {
    /// Insert or update. A reassigned key keeps its original slot, so its
    /// position in iteration order is stable.
    pub fn insert(&mut self, owner: Owner, key: K, value: V) -> Option<V> {
        if let Some(&idx) = self.key_to_idx.get(&key) {
            let old = match self.idx_to_val.get(idx) {
                Some(Slot::Live(value)) => value.clone(),
                _ => {
                    debug_assert!(false, "live key maps to a tombstoned slot");
                    return None;
                }
            };
            let ok = self.idx_to_val.set(owner, idx, Slot::Live(value)).is_ok();
            debug_assert!(ok, "value slot out of range");
            return Some(old);
        }
        debug_assert_eq!(self.next, self.idx_to_key.len());
        self.key_to_idx.insert(owner, key.clone(), self.next);
        self.idx_to_key.push(owner, Slot::Live(key));
        self.idx_to_val.push(owner, Slot::Live(value));
        self.next += 1;
        None
    }

    pub fn remove(&mut self, owner: Owner, key: &K) -> Option<V> {
        let idx = self.key_to_idx.remove(owner, key)?;
        let old = match self.idx_to_val.get(idx) {
            Some(Slot::Live(value)) => Some(value.clone()),
            _ => {
                debug_assert!(false, "live key maps to a tombstoned slot");
                None
            }
        };
        let keys_ok = self.idx_to_key.set(owner, idx, Slot::Deleted).is_ok();
        let vals_ok = self.idx_to_val.set(owner, idx, Slot::Deleted).is_ok();
        debug_assert!(keys_ok && vals_ok, "slot out of range");
        self.holes += 1;
        if self.holes * 2 > self.next && self.next > COMPACT_MIN_SLOTS {
            self.compact(owner);
        }
        old
    }

    /// Rebuild with tombstones dropped and slots renumbered.
    fn compact(&mut self, owner: Owner) {
        trace!(
            live = self.len(),
            holes = self.holes,
            slots = self.next,
            "compacting insertion-order index"
        );
        let mut fresh = OrdMap::new();
        for (key, value) in self.iter() {
            fresh.insert(owner, key.clone(), value.clone());
        }
        *self = fresh;
    }
}

pub struct OrdMapIter<'a, K, V> {
    keys: VecIter<'a, Slot<K>>,
    vals: VecIter<'a, Slot<V>>,
}

impl<'a, K, V> Iterator for OrdMapIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match (self.keys.next()?, self.vals.next()?) {
                (Slot::Live(key), Slot::Live(value)) => return Some((key, value)),
                (Slot::Deleted, Slot::Deleted) => continue,
                _ => {
                    debug_assert!(false, "key and value logs disagree");
                    return None;
                }
            }
        }
    }
}

impl<K, V> Clone for OrdMap<K, V> {
    fn clone(&self) -> Self {
        OrdMap {
            next: self.next,
            holes: self.holes,
            key_to_idx: self.key_to_idx.clone(),
            idx_to_key: self.idx_to_key.clone(),
            idx_to_val: self.idx_to_val.clone(),
        }
    }
}

impl<K, V> Default for OrdMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for OrdMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Hash32 + Eq, V: PartialEq> PartialEq for OrdMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Hash32 + Eq, V: Eq> Eq for OrdMap<K, V> {}

impl<K: Hash32 + Eq + Clone, V: Clone> FromIterator<(K, V)> for OrdMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let owner = Owner::new();
        let mut map = OrdMap::new();
        for (k, v) in iter {
            map.insert(owner, k, v);
        }
        map
    }
}

pub struct OrdSet<K> {
    next: usize,
    holes: usize,
    key_to_idx: PMap<K, usize>,
    idx_to_key: PVec<Slot<K>>,
}

impl<K> OrdSet<K> {
    pub fn new() -> Self {
        OrdSet {
            next: 0,
            holes: 0,
            key_to_idx: PMap::new(),
            idx_to_key: PVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.key_to_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_to_idx.is_empty()
    }

    /// Keys in insertion order.
    pub fn iter(&self) -> OrdSetIter<'_, K> {
        OrdSetIter {
            keys: self.idx_to_key.iter(),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.next == other.next
            && self.holes == other.holes
            && self.key_to_idx.ptr_eq(&other.key_to_idx)
            && self.idx_to_key.ptr_eq(&other.idx_to_key)
    }

    /// Address of the backing allocation; stable across clones of the same
    /// version.
    pub fn heap_id(&self) -> usize {
        self.idx_to_key.heap_id()
    }
}

impl<K: Hash32 + Eq> OrdSet<K> {
    pub fn contains(&self, key: &K) -> bool {
        self.key_to_idx.contains_key(key)
    }
}

impl<K: Hash32 + Eq + Clone> OrdSet<K> {
    /// Returns true when the key was newly added. Re-adding a present key
    /// does not move it.
    pub fn insert(&mut self, owner: Owner, key: K) -> bool {
        if self.key_to_idx.contains_key(&key) {
            return false;
        }
        debug_assert_eq!(self.next, self.idx_to_key.len());
        self.key_to_idx.insert(owner, key.clone(), self.next);
        self.idx_to_key.push(owner, Slot::Live(key));
        self.next += 1;
        true
    }

    /// Returns true when the key was present.
    pub fn remove(&mut self, owner: Owner, key: &K) -> bool {
        let Some(idx) = self.key_to_idx.remove(owner, key) else {
            return false;
        };
        let ok = self.idx_to_key.set(owner, idx, Slot::Deleted).is_ok();
        debug_assert!(ok, "slot out of range");
        self.holes += 1;
        if self.holes * 2 > self.next && self.next > COMPACT_MIN_SLOTS {
            self.compact(owner);
        }
        true
    }

    fn compact(&mut self, owner: Owner) {
        trace!(
            live = self.len(),
            holes = self.holes,
            slots = self.next,
            "compacting insertion-order index"
        );
        let mut fresh = OrdSet::new();
        for key in self.iter() {
            fresh.insert(owner, key.clone());
        }
        *self = fresh;
    }
}

pub struct OrdSetIter<'a, K> {
    keys: VecIter<'a, Slot<K>>,
}

impl<'a, K> Iterator for OrdSetIter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        loop {
            match self.keys.next()? {
                Slot::Live(key) => return Some(key),
                Slot::Deleted => continue,
            }
        }
    }
}

impl<K> Clone for OrdSet<K> {
    fn clone(&self) -> Self {
        OrdSet {
            next: self.next,
            holes: self.holes,
            key_to_idx: self.key_to_idx.clone(),
            idx_to_key: self.idx_to_key.clone(),
        }
    }
}

impl<K> Default for OrdSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: std::fmt::Debug> std::fmt::Debug for OrdSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: Hash32 + Eq> PartialEq for OrdSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|k| other.contains(k))
    }
}

impl<K: Hash32 + Eq> Eq for OrdSet<K> {}

impl<K: Hash32 + Eq + Clone> FromIterator<K> for OrdSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let owner = Owner::new();
        let mut set = OrdSet::new();
        for k in iter {
            set.insert(owner, k);
        }
        set
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::{collection::vec as vec_strategy, prelude::*, proptest};

    #[test]
    fn iteration_follows_insertion_order() {
        let owner = Owner::new();
        let mut m: OrdMap<u32, &str> = OrdMap::new();
        m.insert(owner, 2, "x");
        m.insert(owner, 1, "y");
        m.insert(owner, 3, "z");
        m.remove(owner, &1);
        m.insert(owner, 4, "w");
        let pairs: Vec<(u32, &str)> = m.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(pairs, vec![(2, "x"), (3, "z"), (4, "w")]);
    }

    #[test]
    fn reassignment_keeps_the_slot() {
        let owner = Owner::new();
        let mut m: OrdMap<&str, u32> = OrdMap::new();
        m.insert(owner, "a", 1);
        m.insert(owner, "b", 2);
        assert_eq!(m.insert(owner, "a", 10), Some(1));
        let keys: Vec<&str> = m.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(m.get(&"a"), Some(&10));
    }

    #[test]
    fn readding_a_set_key_does_not_move_it() {
        let owner = Owner::new();
        let mut s: OrdSet<u32> = OrdSet::new();
        s.insert(owner, 1);
        s.insert(owner, 2);
        assert!(!s.insert(owner, 1));
        let keys: Vec<u32> = s.iter().copied().collect();
        assert_eq!(keys, vec![1, 2]);
    }

    #[test]
    fn removed_then_readded_moves_to_the_end() {
        let owner = Owner::new();
        let mut s: OrdSet<u32> = OrdSet::new();
        for k in [1, 2, 3] {
            s.insert(owner, k);
        }
        s.remove(owner, &1);
        s.insert(owner, 1);
        let keys: Vec<u32> = s.iter().copied().collect();
        assert_eq!(keys, vec![2, 3, 1]);
    }

    #[test]
    fn compaction_preserves_order() {
        let owner = Owner::new();
        let mut m: OrdMap<u32, u32> = OrdMap::new();
        for k in 0..100 {
            m.insert(owner, k, k);
        }
        for k in 0..60 {
            m.remove(owner, &k);
        }
        // the tombstone ratio crossed 1/2 along the way, so the log shrank
        assert!(m.next < 100, "compaction did not run");
        assert!(m.holes * 2 <= m.next);
        let keys: Vec<u32> = m.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (60..100).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn matches_ordered_model(ops in vec_strategy((0u32..24, any::<u16>(), any::<bool>()), 0..200)) {
            let owner = Owner::new();
            let mut ours: OrdMap<u32, u16> = OrdMap::new();
            let mut model: Vec<(u32, u16)> = Vec::new();
            for (k, v, is_insert) in ops {
                if is_insert {
                    ours.insert(owner, k, v);
                    match model.iter_mut().find(|(mk, _)| *mk == k) {
                        Some(entry) => entry.1 = v,
                        None => model.push((k, v)),
                    }
                } else {
                    ours.remove(owner, &k);
                    model.retain(|(mk, _)| *mk != k);
                }
            }
            let pairs: Vec<(u32, u16)> = ours.iter().map(|(k, v)| (*k, *v)).collect();
            prop_assert_eq!(pairs, model);
        }
    }
}
