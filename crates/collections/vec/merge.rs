//! Concatenation and slicing.
//!
//! Both operations work on whole subtrees: concatenation zips the right
//! spine of the left tree with the left spine of the right tree, repacking
//! underfull sibling runs; slicing shaves the spines covering the cut
//! points. Branches that come out non-uniform carry a size table.

use std::sync::Arc;

use crate::bits::{BITS, WIDTH};
use crate::owner::Owner;

use super::PVec;
use super::node::{Node, empty_leaf, make_branch, make_editable, new_leaf, spine};

/// Surplus nodes tolerated above the optimal packing before a sibling run
/// gets redistributed.
const MAX_EXTRA_NODES: usize = 2;

impl<T: Clone> PVec<T> {
    /// A vector holding `self`'s elements followed by `other`'s. O(log n):
    /// only the seam between the two trees is rebuilt.
    pub fn concat(&self, owner: Owner, other: &PVec<T>) -> PVec<T> {
        if self.count == 0 {
            return other.clone();
        }
        if other.count == 0 {
            return self.clone();
        }
        if self.count + other.count <= WIDTH {
            let elems: Vec<T> = self.iter().chain(other.iter()).cloned().collect();
            return PVec::from_vec(elems);
        }
        let mut left = self.clone();
        if other.tree_count() == 0 {
            // the right side is tail-only
            for value in other.tail.iter() {
                left.push(owner, value.clone());
            }
            return left;
        }
        left.flush_tail(owner);
        let (root, shift) = merge_trees(&left.root, left.shift, &other.root, other.shift, owner);
        let mut out = PVec {
            count: left.count + other.count,
            shift,
            root,
            tail: other.tail.clone(),
            tail_owner: None,
        };
        out.contract_root();
        out
    }

    /// Elements in `[from, to)`, both bounds clamped to the vector.
    pub fn slice(&self, owner: Owner, from: usize, to: usize) -> PVec<T> {
        let hi = to.min(self.count);
        let lo = from.min(hi);
        let len = hi - lo;
        if len == 0 {
            return PVec::new();
        }
        if len <= WIDTH {
            let elems: Vec<T> = (lo..hi).filter_map(|i| self.get(i).cloned()).collect();
            return PVec::from_vec(elems);
        }
        let mut out = self.clone();
        out.take_in_place(owner, hi);
        out.drop_in_place(owner, lo);
        out
    }

    /// Move the tail into the trie, leaving the tail empty. The pushed leaf
    /// may be partial, which relaxes the spine it lands on.
    fn flush_tail(&mut self, owner: Owner) {
        if self.tail.is_empty() {
            return;
        }
        let tree_count = self.tree_count();
        let elems = self.take_tail();
        self.push_down(owner, tree_count, elems);
    }

    /// Keep the first `n` elements.
    fn take_in_place(&mut self, owner: Owner, n: usize) {
        if n >= self.count {
            return;
        }
        let tree_count = self.tree_count();
        if n >= tree_count {
            // the cut lands in the tail
            self.editable_tail(owner).truncate(n - tree_count);
            self.count = n;
            return;
        }
        self.tail = Arc::new(Vec::new());
        self.tail_owner = None;
        take_tree(&mut self.root, self.shift, n, owner);
        self.count = n;
        self.contract_root();
        self.demote_rightmost(owner);
    }

    /// Drop the first `k` elements.
    fn drop_in_place(&mut self, owner: Owner, k: usize) {
        if k == 0 {
            return;
        }
        debug_assert!(k < self.count);
        let tree_count = self.tree_count();
        if k >= tree_count {
            // everything that survives lives in the tail
            let elems: Vec<T> = self.tail[k - tree_count..].to_vec();
            *self = PVec {
                count: elems.len(),
                shift: 0,
                root: empty_leaf(),
                tail: Arc::new(elems),
                tail_owner: Some(owner),
            };
            return;
        }
        drop_tree(&mut self.root, self.shift, k, owner);
        self.count -= k;
        self.contract_root();
    }
}

fn merge_trees<T: Clone>(
    left: &Arc<Node<T>>,
    left_shift: usize,
    right: &Arc<Node<T>>,
    right_shift: usize,
    owner: Owner,
) -> (Arc<Node<T>>, usize) {
    let shift = left_shift.max(right_shift);
    let left = spine(left.clone(), left_shift, shift, owner);
    let right = spine(right.clone(), right_shift, shift, owner);
    let mut merged = merge_level(&left, &right, shift, owner);
    if merged.len() == 1 {
        match merged.pop() {
            Some(root) => (root, shift),
            None => (empty_leaf(), 0),
        }
    } else {
        (make_branch(merged, shift + BITS, owner), shift + BITS)
    }
}

/// Merge two subtrees at the same level into one or two nodes at that level.
fn merge_level<T: Clone>(
    left: &Arc<Node<T>>,
    right: &Arc<Node<T>>,
    shift: usize,
    owner: Owner,
) -> Vec<Arc<Node<T>>> {
    if shift == 0 {
        let (Node::Leaf(l), Node::Leaf(r)) = (&**left, &**right) else {
            debug_assert!(false, "branch at level 0");
            return vec![left.clone(), right.clone()];
        };
        if l.elems.len() + r.elems.len() <= WIDTH {
            let mut elems = Vec::with_capacity(l.elems.len() + r.elems.len());
            elems.extend_from_slice(&l.elems);
            elems.extend_from_slice(&r.elems);
            return vec![new_leaf(elems, owner)];
        }
        return vec![left.clone(), right.clone()];
    }
    let (Node::Branch(lb), Node::Branch(rb)) = (&**left, &**right) else {
        debug_assert!(false, "leaf above level 0");
        return vec![left.clone(), right.clone()];
    };
    let Some((l_last, l_init)) = lb.children.split_last() else {
        return vec![right.clone()];
    };
    let Some((r_first, r_rest)) = rb.children.split_first() else {
        return vec![left.clone()];
    };
    let mid = merge_level(l_last, r_first, shift - BITS, owner);
    let mut children = Vec::with_capacity(l_init.len() + mid.len() + r_rest.len());
    children.extend_from_slice(l_init);
    children.extend(mid);
    children.extend_from_slice(r_rest);
    let children = rebalance(children, shift - BITS, owner);
    pack(children, shift, owner)
}

/// Repack a sibling run when it wastes more than [`MAX_EXTRA_NODES`] nodes
/// over the tightest packing.
fn rebalance<T: Clone>(
    children: Vec<Arc<Node<T>>>,
    child_shift: usize,
    owner: Owner,
) -> Vec<Arc<Node<T>>> {
    let counts: Vec<usize> = children.iter().map(|c| c.slot_count()).collect();
    let total: usize = counts.iter().sum();
    let optimal = total.div_ceil(WIDTH);
    if children.len() <= optimal + MAX_EXTRA_NODES {
        return children;
    }
    let plan = concat_plan(counts, optimal);
    execute_plan(&children, &plan, child_shift, owner)
}

/// Decide the slot count of each node after redistribution: short nodes are
/// absorbed into their right siblings until the run is tight enough.
fn concat_plan(mut plan: Vec<usize>, optimal: usize) -> Vec<usize> {
    while plan.len() > optimal + MAX_EXTRA_NODES {
        let mut i = 0;
        while plan[i] >= WIDTH - 1 {
            i += 1;
        }
        let mut remaining = plan[i];
        loop {
            debug_assert!(i + 1 < plan.len(), "concat plan ran off the end");
            let next = plan[i + 1];
            let merged = (remaining + next).min(WIDTH);
            plan[i] = merged;
            remaining = remaining + next - merged;
            i += 1;
            if remaining == 0 {
                break;
            }
        }
        plan.remove(i);
    }
    plan
}

/// Rebuild the sibling run to the planned slot counts. Nodes whose count is
/// untouched and aligned are reused by reference.
fn execute_plan<T: Clone>(
    children: &[Arc<Node<T>>],
    plan: &[usize],
    child_shift: usize,
    owner: Owner,
) -> Vec<Arc<Node<T>>> {
    let mut out = Vec::with_capacity(plan.len());
    let mut src = 0;
    let mut offset = 0;
    for &want in plan {
        if offset == 0 && children[src].slot_count() == want {
            out.push(children[src].clone());
            src += 1;
            continue;
        }
        if child_shift == 0 {
            let mut elems: Vec<T> = Vec::with_capacity(want);
            while elems.len() < want {
                let Node::Leaf(leaf) = &*children[src] else {
                    debug_assert!(false, "branch at level 0");
                    break;
                };
                let take = (want - elems.len()).min(leaf.elems.len() - offset);
                elems.extend_from_slice(&leaf.elems[offset..offset + take]);
                offset += take;
                if offset == leaf.elems.len() {
                    src += 1;
                    offset = 0;
                }
            }
            out.push(new_leaf(elems, owner));
        } else {
            let mut grand: Vec<Arc<Node<T>>> = Vec::with_capacity(want);
            while grand.len() < want {
                let Node::Branch(branch) = &*children[src] else {
                    debug_assert!(false, "leaf above level 0");
                    break;
                };
                let take = (want - grand.len()).min(branch.children.len() - offset);
                grand.extend_from_slice(&branch.children[offset..offset + take]);
                offset += take;
                if offset == branch.children.len() {
                    src += 1;
                    offset = 0;
                }
            }
            out.push(make_branch(grand, child_shift, owner));
        }
    }
    out
}

/// Group a run of up to 64 siblings into one or two parent branches.
fn pack<T: Clone>(mut children: Vec<Arc<Node<T>>>, shift: usize, owner: Owner) -> Vec<Arc<Node<T>>> {
    debug_assert!(children.len() <= 2 * WIDTH);
    if children.len() <= WIDTH {
        vec![make_branch(children, shift, owner)]
    } else {
        let right = children.split_off(WIDTH);
        vec![
            make_branch(children, shift, owner),
            make_branch(right, shift, owner),
        ]
    }
}

/// Truncate the subtree to its first `n` elements (`1 <= n < size`).
fn take_tree<T: Clone>(arc: &mut Arc<Node<T>>, shift: usize, n: usize, owner: Owner) {
    let node = make_editable(arc, owner);
    match node {
        Node::Leaf(leaf) => leaf.elems.truncate(n),
        Node::Branch(branch) => {
            let (slot, sub) = branch.position(n - 1, shift);
            branch.children.truncate(slot + 1);
            if let Some(sizes) = &mut branch.sizes {
                sizes.truncate(slot + 1);
                sizes[slot] = n;
            }
            let keep_in_child = sub + 1;
            let child_size = branch.children[slot].size(shift - BITS);
            if keep_in_child < child_size {
                take_tree(&mut branch.children[slot], shift - BITS, keep_in_child, owner);
            }
        }
    }
}

/// Remove the first `k` elements of the subtree (`1 <= k < size`). The
/// surviving spine becomes relaxed.
fn drop_tree<T: Clone>(arc: &mut Arc<Node<T>>, shift: usize, k: usize, owner: Owner) {
    let node = make_editable(arc, owner);
    match node {
        Node::Leaf(leaf) => {
            leaf.elems.drain(..k);
        }
        Node::Branch(branch) => {
            branch.ensure_sizes(shift);
            let (slot, sub) = branch.position(k, shift);
            let new_sizes: Vec<usize> = match &branch.sizes {
                Some(sizes) => sizes[slot..].iter().map(|s| s - k).collect(),
                None => Vec::new(),
            };
            branch.children.drain(..slot);
            branch.sizes = Some(new_sizes);
            if sub > 0 {
                drop_tree(&mut branch.children[0], shift - BITS, sub, owner);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::PVec;
    use crate::owner::Owner;
    use proptest::{collection::vec as vec_strategy, prelude::*, proptest};

    #[test]
    fn concat_medium() {
        let owner = Owner::new();
        let a: PVec<usize> = (0..100).collect();
        let b: PVec<usize> = (100..200).collect();
        let joined = a.concat(owner, &b);
        assert_eq!(joined.len(), 200);
        for i in 0..200 {
            assert_eq!(joined.get(i), Some(&i));
        }
        // sources untouched
        assert_eq!(a.to_vec(), (0..100).collect::<Vec<_>>());
        assert_eq!(b.to_vec(), (100..200).collect::<Vec<_>>());
    }

    #[test]
    fn concat_small_folds_into_tail() {
        let owner = Owner::new();
        let a = PVec::from_slice(&[1, 2]);
        let b = PVec::from_slice(&[3, 4, 5]);
        let joined = a.concat(owner, &b);
        assert_eq!(joined.to_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn concat_with_empty() {
        let owner = Owner::new();
        let a: PVec<u32> = (0..50).collect();
        let empty = PVec::new();
        assert_eq!(a.concat(owner, &empty).to_vec(), a.to_vec());
        assert_eq!(empty.concat(owner, &a).to_vec(), a.to_vec());
    }

    #[test]
    fn slice_clamps_bounds() {
        let owner = Owner::new();
        let v = PVec::from_slice(&[1, 2, 3]);
        assert_eq!(v.slice(owner, 0, 100).to_vec(), vec![1, 2, 3]);
        assert!(v.slice(owner, 100, 200).is_empty());
        assert!(v.slice(owner, 2, 1).is_empty());
    }

    #[test]
    fn slice_interior() {
        let owner = Owner::new();
        let v: PVec<usize> = (0..500).collect();
        let s = v.slice(owner, 100, 400);
        assert_eq!(s.len(), 300);
        for i in 0..300 {
            assert_eq!(s.get(i), Some(&(i + 100)));
        }
        assert_eq!(v.len(), 500);
    }

    #[test]
    fn relaxed_tree_supports_all_ops() {
        let owner = Owner::new();
        let a: PVec<usize> = (0..70).collect();
        let b: PVec<usize> = (70..300).collect();
        let mut joined = a.concat(owner, &b).slice(owner, 10, 290);
        // joined = 10..290 over a relaxed tree
        let owner = Owner::new();
        joined.push(owner, 999);
        assert_eq!(joined.pop(owner), Some(999));
        joined.set(owner, 0, 555).unwrap();
        assert_eq!(joined.get(0), Some(&555));
        assert_eq!(joined.get(1), Some(&11));
        assert_eq!(joined.len(), 280);
        assert_eq!(joined.pop(owner), Some(289));
    }

    proptest! {
        #[test]
        fn concat_matches_std(
            xs in vec_strategy(any::<u16>(), 0..400),
            ys in vec_strategy(any::<u16>(), 0..400),
        ) {
            let owner = Owner::new();
            let a = PVec::from_slice(&xs);
            let b = PVec::from_slice(&ys);
            let joined = a.concat(owner, &b);
            let mut expect = xs.clone();
            expect.extend_from_slice(&ys);
            prop_assert_eq!(joined.to_vec(), expect);
        }

        #[test]
        fn slice_matches_std(
            xs in vec_strategy(any::<u16>(), 0..500),
            a in any::<u16>(),
            b in any::<u16>(),
        ) {
            let owner = Owner::new();
            let v = PVec::from_slice(&xs);
            let hi = (b as usize).min(xs.len());
            let lo = (a as usize).min(hi);
            let s = v.slice(owner, lo, hi);
            prop_assert_eq!(s.to_vec(), xs[lo..hi].to_vec());
        }

        #[test]
        fn repeated_concat_stays_consistent(
            chunks in vec_strategy(vec_strategy(any::<u16>(), 0..70), 0..8),
        ) {
            let owner = Owner::new();
            let mut joined: PVec<u16> = PVec::new();
            let mut expect = Vec::new();
            for chunk in &chunks {
                joined = joined.concat(owner, &PVec::from_slice(chunk));
                expect.extend_from_slice(chunk);
            }
            prop_assert_eq!(joined.to_vec(), expect.clone());
            // pushes and pops still behave after stacked merges
            let owner = Owner::new();
            let mut w = joined.clone();
            w.push(owner, 7);
            prop_assert_eq!(w.pop(owner), Some(7));
            prop_assert_eq!(w.pop(owner), expect.last().copied());
        }
    }
}
