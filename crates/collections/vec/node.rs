use std::sync::Arc;

use crate::bits::{BITS, capacity};
use crate::owner::Owner;

/// A node of the vector trie.
#[derive(Debug, Clone)]
pub(crate) enum Node<T> {
    Branch(BranchNode<T>),
    Leaf(LeafNode<T>),
}

/// Internal node. Children all live one level down; leaves sit at level 0.
#[derive(Debug, Clone)]
pub(crate) struct BranchNode<T> {
    pub owner: Option<Owner>,
    pub children: Vec<Arc<Node<T>>>,
    /// Cumulative child sizes. Present iff the branch is relaxed, i.e. its
    /// non-last children are not all complete subtrees.
    pub sizes: Option<Vec<usize>>,
}

/// Terminal node holding up to 32 elements.
#[derive(Debug, Clone)]
pub(crate) struct LeafNode<T> {
    pub owner: Option<Owner>,
    pub elems: Vec<T>,
}

pub(crate) fn empty_leaf<T>() -> Arc<Node<T>> {
    Arc::new(Node::Leaf(LeafNode {
        owner: None,
        elems: Vec::new(),
    }))
}

pub(crate) fn new_leaf<T>(elems: Vec<T>, owner: Owner) -> Arc<Node<T>> {
    Arc::new(Node::Leaf(LeafNode {
        owner: Some(owner),
        elems,
    }))
}

/// Wrap `node` (a subtree at `from_shift`) in single-child branches until it
/// reaches `to_shift`.
pub(crate) fn spine<T>(
    mut node: Arc<Node<T>>,
    mut from_shift: usize,
    to_shift: usize,
    owner: Owner,
) -> Arc<Node<T>> {
    while from_shift < to_shift {
        from_shift += BITS;
        node = Arc::new(Node::Branch(BranchNode {
            owner: Some(owner),
            children: vec![node],
            sizes: None,
        }));
    }
    node
}

/// Clone-for-edit: nodes stamped by the active session are patched in place,
/// anything else is copied once and stamped. A stamped node normally has a
/// single reference; if the vector was cloned mid-session, `make_mut` copies
/// again rather than corrupting the shared node.
pub(crate) fn make_editable<T: Clone>(arc: &mut Arc<Node<T>>, owner: Owner) -> &mut Node<T> {
    if arc.owner() != Some(owner) {
        let mut copy = (**arc).clone();
        copy.set_owner(owner);
        *arc = Arc::new(copy);
    }
    Arc::make_mut(arc)
}

impl<T> Node<T> {
    pub fn owner(&self) -> Option<Owner> {
        match self {
            Node::Branch(b) => b.owner,
            Node::Leaf(l) => l.owner,
        }
    }

    fn set_owner(&mut self, owner: Owner) {
        match self {
            Node::Branch(b) => b.owner = Some(owner),
            Node::Leaf(l) => l.owner = Some(owner),
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Node::Branch(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Node::Branch(b) => b.children.is_empty(),
            Node::Leaf(l) => l.elems.is_empty(),
        }
    }

    /// Number of elements in the subtree rooted here. `shift` is this node's
    /// level. O(depth) for regular spines, O(1) for relaxed branches.
    pub fn size(&self, shift: usize) -> usize {
        match self {
            Node::Leaf(l) => l.elems.len(),
            Node::Branch(b) => {
                if let Some(sizes) = &b.sizes {
                    sizes.last().copied().unwrap_or(0)
                } else {
                    match b.children.len() {
                        0 => 0,
                        n => (n - 1) * (1 << shift) + b.children[n - 1].size(shift - BITS),
                    }
                }
            }
        }
    }

    /// Direct slot count: children for branches, elements for leaves.
    pub fn slot_count(&self) -> usize {
        match self {
            Node::Branch(b) => b.children.len(),
            Node::Leaf(l) => l.elems.len(),
        }
    }
}

impl<T> BranchNode<T> {
    /// Locate the child covering `index` and the index within that child.
    /// Regular branches decompose the index arithmetically; relaxed branches
    /// probe the cumulative sizes starting from the arithmetic guess (the
    /// true slot can only be at or after it).
    pub fn position(&self, index: usize, shift: usize) -> (usize, usize) {
        if let Some(sizes) = &self.sizes {
            let mut slot = (index >> shift).min(sizes.len().saturating_sub(1));
            while sizes[slot] <= index {
                slot += 1;
                debug_assert!(slot < sizes.len(), "index beyond relaxed branch");
            }
            let before = if slot == 0 { 0 } else { sizes[slot - 1] };
            (slot, index - before)
        } else {
            (index >> shift, index & ((1 << shift) - 1))
        }
    }

    /// Materialise the cumulative size table, turning the branch relaxed.
    pub fn ensure_sizes(&mut self, shift: usize) {
        if self.sizes.is_some() {
            return;
        }
        let mut acc = 0;
        let sizes = self
            .children
            .iter()
            .map(|child| {
                acc += child.size(shift - BITS);
                acc
            })
            .collect();
        self.sizes = Some(sizes);
    }

    /// Whether the last direct child is a complete subtree. Appending after
    /// an incomplete child forces the branch relaxed.
    pub fn last_child_complete(&self, shift: usize) -> bool {
        match self.children.last() {
            Some(child) => child.size(shift - BITS) == capacity(shift - BITS),
            None => true,
        }
    }
}

/// Build a branch at `shift` over `children` one level down, attaching a
/// size table only when the result is not regular.
pub(crate) fn make_branch<T>(children: Vec<Arc<Node<T>>>, shift: usize, owner: Owner) -> Arc<Node<T>> {
    let child_cap = capacity(shift - BITS);
    let mut sizes = Vec::with_capacity(children.len());
    let mut acc = 0;
    let mut regular = true;
    for (i, child) in children.iter().enumerate() {
        let size = child.size(shift - BITS);
        if i + 1 < children.len() && size != child_cap {
            regular = false;
        }
        acc += size;
        sizes.push(acc);
    }
    Arc::new(Node::Branch(BranchNode {
        owner: Some(owner),
        children,
        sizes: (!regular).then_some(sizes),
    }))
}
