//! Splay tree indexed by cumulative weight.
//!
//! Backs positional addressing for sequence containers. Every value exposes a
//! weight (1 or 0 for array slots, character count for text runs) and each
//! node caches the weight of its subtree, so a position can be resolved by
//! descending from the root.
//!
//! Structure:
//! - All nodes live in one Vec and refer to each other by u32 index
//! - Nodes are threaded in order (prev/next) for O(1) neighbour walks
//! - Splaying is the only rebalancing; there is no balance factor
//!
//! Operations (amortized):
//! - insert_after: O(log n) - splays the new node to the root
//! - find: O(log n) - descends by subtree weight, splays the hit
//! - delete: O(log n) - splays, then joins the subtrees via the left maximum
//! - index_of: O(log n)
//! - split_off/append: O(k log n) where k is the number of nodes moved

/// Sentinel value for no parent / no child / no neighbour.
const NONE: u32 = u32::MAX;

/// A value stored in a splay tree.
pub trait Weighted {
    /// Positional width of this value. Zero-width values are skipped by `find`.
    fn weight(&self) -> u64;
}

/// Stable handle to a node.
///
/// Handles stay valid until the node is deleted. The slot of a deleted
/// node is reused, so holders must drop handles they delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

#[derive(Clone, Debug)]
struct Node<V> {
    /// None once the slot has been freed.
    value: Option<V>,
    /// Own weight, cached from the value.
    weight: u64,
    /// Own weight plus both subtrees.
    subtree: u64,
    parent: u32,
    left: u32,
    right: u32,
    prev: u32,
    next: u32,
}

impl<V> Node<V> {
    fn vacant() -> Node<V> {
        return Node {
            value: None,
            weight: 0,
            subtree: 0,
            parent: NONE,
            left: NONE,
            right: NONE,
            prev: NONE,
            next: NONE,
        };
    }
}

/// A self-adjusting binary tree ordered by insertion position.
#[derive(Clone, Debug)]
pub struct SplayTree<V> {
    nodes: Vec<Node<V>>,
    root: u32,
    first: u32,
    last: u32,
    free: Vec<u32>,
    len: usize,
}

impl<V> Default for SplayTree<V> {
    fn default() -> Self {
        return Self::new();
    }
}

impl<V> SplayTree<V> {
    pub fn new() -> SplayTree<V> {
        return SplayTree {
            nodes: Vec::new(),
            root: NONE,
            first: NONE,
            last: NONE,
            free: Vec::new(),
            len: 0,
        };
    }

    /// Number of nodes, including zero-weight ones.
    pub fn len(&self) -> usize {
        return self.len;
    }

    pub fn is_empty(&self) -> bool {
        return self.len == 0;
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> u64 {
        return self.subtree(self.root);
    }

    #[inline]
    fn is_live(&self, idx: u32) -> bool {
        return self
            .nodes
            .get(idx as usize)
            .is_some_and(|node| node.value.is_some());
    }

    pub fn contains(&self, id: NodeId) -> bool {
        return self.is_live(id.0);
    }

    pub fn get(&self, id: NodeId) -> Option<&V> {
        return self.nodes.get(id.0 as usize)?.value.as_ref();
    }

    /// Mutable access to a value.
    ///
    /// If the change alters the value's weight, call `refresh` afterwards
    /// (or use `update`, which does both).
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut V> {
        return self.nodes.get_mut(id.0 as usize)?.value.as_mut();
    }

    fn link(idx: u32) -> Option<NodeId> {
        if idx == NONE {
            return None;
        }
        return Some(NodeId(idx));
    }

    pub fn root(&self) -> Option<NodeId> {
        return Self::link(self.root);
    }

    pub fn first(&self) -> Option<NodeId> {
        return Self::link(self.first);
    }

    pub fn last(&self) -> Option<NodeId> {
        return Self::link(self.last);
    }

    /// In-order successor.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        if !self.is_live(id.0) {
            return None;
        }
        return Self::link(self.nodes[id.0 as usize].next);
    }

    /// In-order predecessor.
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        if !self.is_live(id.0) {
            return None;
        }
        return Self::link(self.nodes[id.0 as usize].prev);
    }

    /// Iterate over all nodes in order, zero-weight ones included.
    pub fn iter(&self) -> Iter<'_, V> {
        return Iter {
            tree: self,
            cursor: self.first,
        };
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        return self.iter().map(|(_, value)| value);
    }

    #[inline]
    fn subtree(&self, idx: u32) -> u64 {
        if idx == NONE {
            return 0;
        }
        return self.nodes[idx as usize].subtree;
    }

    /// Recompute the cached subtree weight of a node from its children.
    #[inline]
    fn update_subtree(&mut self, idx: u32) {
        if idx == NONE {
            return;
        }
        let node = &self.nodes[idx as usize];
        let total = node.weight + self.subtree(node.left) + self.subtree(node.right);
        self.nodes[idx as usize].subtree = total;
    }

    /// Right rotation around `idx`.
    fn rotate_right(&mut self, idx: u32) {
        let left_idx = self.nodes[idx as usize].left;
        if left_idx == NONE {
            return;
        }

        let parent_idx = self.nodes[idx as usize].parent;
        let left_right = self.nodes[left_idx as usize].right;

        self.nodes[left_idx as usize].parent = parent_idx;
        self.nodes[left_idx as usize].right = idx;

        self.nodes[idx as usize].parent = left_idx;
        self.nodes[idx as usize].left = left_right;

        if left_right != NONE {
            self.nodes[left_right as usize].parent = idx;
        }

        if parent_idx == NONE {
            self.root = left_idx;
        } else {
            let parent = &mut self.nodes[parent_idx as usize];
            if parent.left == idx {
                parent.left = left_idx;
            } else {
                parent.right = left_idx;
            }
        }

        // Child first: the new parent's total depends on it
        self.update_subtree(idx);
        self.update_subtree(left_idx);
    }

    /// Left rotation around `idx`.
    fn rotate_left(&mut self, idx: u32) {
        let right_idx = self.nodes[idx as usize].right;
        if right_idx == NONE {
            return;
        }

        let parent_idx = self.nodes[idx as usize].parent;
        let right_left = self.nodes[right_idx as usize].left;

        self.nodes[right_idx as usize].parent = parent_idx;
        self.nodes[right_idx as usize].left = idx;

        self.nodes[idx as usize].parent = right_idx;
        self.nodes[idx as usize].right = right_left;

        if right_left != NONE {
            self.nodes[right_left as usize].parent = idx;
        }

        if parent_idx == NONE {
            self.root = right_idx;
        } else {
            let parent = &mut self.nodes[parent_idx as usize];
            if parent.left == idx {
                parent.left = right_idx;
            } else {
                parent.right = right_idx;
            }
        }

        self.update_subtree(idx);
        self.update_subtree(right_idx);
    }

    /// Splay a node up until it has no parent.
    fn splay_idx(&mut self, idx: u32) {
        if idx == NONE {
            return;
        }
        while self.nodes[idx as usize].parent != NONE {
            let parent_idx = self.nodes[idx as usize].parent;
            let grandparent_idx = self.nodes[parent_idx as usize].parent;

            let is_left_child = self.nodes[parent_idx as usize].left == idx;

            if grandparent_idx == NONE {
                // Zig step
                if is_left_child {
                    self.rotate_right(parent_idx);
                } else {
                    self.rotate_left(parent_idx);
                }
            } else {
                let parent_is_left = self.nodes[grandparent_idx as usize].left == parent_idx;

                if is_left_child == parent_is_left {
                    // Zig-zig step
                    if is_left_child {
                        self.rotate_right(grandparent_idx);
                        self.rotate_right(parent_idx);
                    } else {
                        self.rotate_left(grandparent_idx);
                        self.rotate_left(parent_idx);
                    }
                } else {
                    // Zig-zag step
                    if is_left_child {
                        self.rotate_right(parent_idx);
                        self.rotate_left(grandparent_idx);
                    } else {
                        self.rotate_left(parent_idx);
                        self.rotate_right(grandparent_idx);
                    }
                }
            }
        }
        self.root = idx;
    }

    /// Move a node to the root.
    pub fn splay(&mut self, id: NodeId) {
        if self.is_live(id.0) {
            self.splay_idx(id.0);
        }
    }

    /// Find the node covering weight position `pos`.
    ///
    /// Returns the node and the offset of `pos` inside it, with
    /// `offset < weight`. The node is splayed to the root.
    pub fn find(&mut self, pos: u64) -> Option<(NodeId, u64)> {
        if self.root == NONE || pos >= self.total_weight() {
            return None;
        }

        let mut current = self.root;
        let mut remaining = pos;

        loop {
            let (left, right, weight) = {
                let node = &self.nodes[current as usize];
                (node.left, node.right, node.weight)
            };

            let left_size = self.subtree(left);
            if remaining < left_size {
                current = left;
                continue;
            }
            remaining -= left_size;

            if remaining < weight {
                self.splay_idx(current);
                return Some((NodeId(current), remaining));
            }
            remaining -= weight;

            if right == NONE {
                return None;
            }
            current = right;
        }
    }

    /// Sum of the weights of every node before `id`.
    pub fn index_of(&mut self, id: NodeId) -> Option<u64> {
        if !self.is_live(id.0) {
            return None;
        }
        self.splay_idx(id.0);
        let left = self.nodes[id.0 as usize].left;
        return Some(self.subtree(left));
    }

    /// Remove a node and return its value.
    pub fn delete(&mut self, id: NodeId) -> Option<V> {
        let idx = id.0;
        if !self.is_live(idx) {
            return None;
        }

        self.splay_idx(idx);

        let left = self.nodes[idx as usize].left;
        let right = self.nodes[idx as usize].right;
        if left != NONE {
            self.nodes[left as usize].parent = NONE;
        }
        if right != NONE {
            self.nodes[right as usize].parent = NONE;
        }

        if left != NONE {
            // The predecessor of the root is the maximum of its left subtree.
            let max = self.nodes[idx as usize].prev;
            self.splay_idx(max);
            self.nodes[max as usize].right = right;
            if right != NONE {
                self.nodes[right as usize].parent = max;
            }
            self.update_subtree(max);
            self.root = max;
        } else {
            self.root = right;
        }

        let prev = self.nodes[idx as usize].prev;
        let next = self.nodes[idx as usize].next;
        if prev != NONE {
            self.nodes[prev as usize].next = next;
        } else {
            self.first = next;
        }
        if next != NONE {
            self.nodes[next as usize].prev = prev;
        } else {
            self.last = prev;
        }

        self.len -= 1;
        let node = std::mem::replace(&mut self.nodes[idx as usize], Node::vacant());
        self.free.push(idx);
        return node.value;
    }

    /// Verify cached weights, parent links and threading against a full walk.
    pub fn check_weights(&self) -> bool
    where
        V: Weighted,
    {
        let mut live = 0;
        for (idx, node) in self.nodes.iter().enumerate() {
            let Some(value) = node.value.as_ref() else {
                continue;
            };
            live += 1;
            if node.weight != value.weight() {
                return false;
            }
            if node.subtree != node.weight + self.subtree(node.left) + self.subtree(node.right) {
                return false;
            }
            for child in [node.left, node.right] {
                if child != NONE && self.nodes[child as usize].parent != idx as u32 {
                    return false;
                }
            }
        }
        if live != self.len {
            return false;
        }
        if self.root != NONE && self.nodes[self.root as usize].parent != NONE {
            return false;
        }

        // In-order walk must agree with the threaded order.
        let mut in_order = Vec::with_capacity(self.len);
        let mut stack = Vec::new();
        let mut current = self.root;
        while current != NONE || !stack.is_empty() {
            while current != NONE {
                stack.push(current);
                current = self.nodes[current as usize].left;
            }
            if let Some(idx) = stack.pop() {
                in_order.push(idx);
                current = self.nodes[idx as usize].right;
            }
        }
        let threaded: Vec<u32> = self.iter().map(|(id, _)| id.0).collect();
        return in_order == threaded;
    }
}

impl<V: Weighted> SplayTree<V> {
    fn alloc(&mut self, value: V) -> u32 {
        let weight = value.weight();
        let node = Node {
            value: Some(value),
            weight,
            subtree: weight,
            parent: NONE,
            left: NONE,
            right: NONE,
            prev: NONE,
            next: NONE,
        };
        if let Some(idx) = self.free.pop() {
            self.nodes[idx as usize] = node;
            return idx;
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(node);
        return idx;
    }

    /// Insert a value directly after `prev`, or at the front when `prev` is None.
    /// The new node becomes the root.
    pub fn insert_after(&mut self, prev: Option<NodeId>, value: V) -> NodeId {
        let idx = self.alloc(value);
        self.len += 1;

        match prev {
            Some(NodeId(p)) => {
                debug_assert!(self.is_live(p), "insert after a deleted node");
                self.splay_idx(p);

                // Take prev's right subtree as our right subtree
                let p_right = self.nodes[p as usize].right;
                self.nodes[idx as usize].parent = p;
                self.nodes[idx as usize].right = p_right;
                if p_right != NONE {
                    self.nodes[p_right as usize].parent = idx;
                }
                self.nodes[p as usize].right = idx;

                let p_next = self.nodes[p as usize].next;
                self.nodes[idx as usize].prev = p;
                self.nodes[idx as usize].next = p_next;
                if p_next != NONE {
                    self.nodes[p_next as usize].prev = idx;
                } else {
                    self.last = idx;
                }
                self.nodes[p as usize].next = idx;

                self.update_subtree(idx);
                self.update_subtree(p);
            }
            None => {
                if self.first == NONE {
                    self.root = idx;
                    self.first = idx;
                    self.last = idx;
                } else {
                    // The leftmost node has no left child once splayed.
                    let first = self.first;
                    self.splay_idx(first);
                    self.nodes[first as usize].left = idx;
                    self.nodes[idx as usize].parent = first;
                    self.nodes[idx as usize].next = first;
                    self.nodes[first as usize].prev = idx;
                    self.first = idx;
                    self.update_subtree(first);
                }
            }
        }

        self.splay_idx(idx);
        return NodeId(idx);
    }

    /// Append a value at the end.
    pub fn push(&mut self, value: V) -> NodeId {
        let last = self.last();
        return self.insert_after(last, value);
    }

    /// Recompute a node's weight after its value changed.
    pub fn refresh(&mut self, id: NodeId) {
        let idx = id.0;
        let Some(weight) = self.get(id).map(|value| value.weight()) else {
            return;
        };
        self.nodes[idx as usize].weight = weight;
        // Every stale ancestor is rotated below the node and recomputed.
        self.update_subtree(idx);
        self.splay_idx(idx);
    }

    /// Mutate a value in place and keep the weights in sync.
    pub fn update<R>(&mut self, id: NodeId, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let value = self.get_mut(id)?;
        let result = f(value);
        self.refresh(id);
        return Some(result);
    }

    /// Split the tree at weight position `pos`.
    ///
    /// Nodes that start before `pos` stay; the rest move into the returned
    /// tree. Handles to moved nodes are invalidated.
    pub fn split_off(&mut self, pos: u64) -> SplayTree<V> {
        if self.root == NONE {
            return SplayTree::new();
        }
        if pos == 0 {
            return std::mem::take(self);
        }

        let boundary = if pos > self.total_weight() {
            self.last
        } else {
            match self.find(pos - 1) {
                Some((NodeId(idx), _)) => idx,
                None => self.last,
            }
        };

        self.splay_idx(boundary);
        let detached = self.nodes[boundary as usize].right;
        let mut right = SplayTree::new();
        if detached == NONE {
            return right;
        }

        self.nodes[boundary as usize].right = NONE;
        self.nodes[detached as usize].parent = NONE;
        self.update_subtree(boundary);

        let mut cursor = self.nodes[boundary as usize].next;
        self.nodes[boundary as usize].next = NONE;
        self.last = boundary;

        while cursor != NONE {
            let next = self.nodes[cursor as usize].next;
            let node = std::mem::replace(&mut self.nodes[cursor as usize], Node::vacant());
            self.free.push(cursor);
            self.len -= 1;
            if let Some(value) = node.value {
                right.push(value);
            }
            cursor = next;
        }

        return right;
    }

    /// Move every node of `other` to the end of this tree, keeping its order.
    pub fn append(&mut self, mut other: SplayTree<V>) {
        let mut cursor = other.first;
        while cursor != NONE {
            let next = other.nodes[cursor as usize].next;
            if let Some(value) = other.nodes[cursor as usize].value.take() {
                self.push(value);
            }
            cursor = next;
        }
    }
}

/// In-order iterator over `(NodeId, &V)`.
pub struct Iter<'a, V> {
    tree: &'a SplayTree<V>,
    cursor: u32,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (NodeId, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor != NONE {
            let idx = self.cursor;
            let node = &self.tree.nodes[idx as usize];
            self.cursor = node.next;
            if let Some(value) = node.value.as_ref() {
                return Some((NodeId(idx), value));
            }
        }
        return None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Run {
        text: &'static str,
        removed: bool,
    }

    impl Weighted for Run {
        fn weight(&self) -> u64 {
            if self.removed {
                return 0;
            }
            return self.text.len() as u64;
        }
    }

    fn run(text: &'static str) -> Run {
        return Run { text, removed: false };
    }

    fn contents(tree: &SplayTree<Run>) -> String {
        return tree.values().filter(|r| !r.removed).map(|r| r.text).collect();
    }

    #[test]
    fn empty_tree() {
        let mut tree: SplayTree<Run> = SplayTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.total_weight(), 0);
        assert!(tree.find(0).is_none());
        assert!(tree.check_weights());
    }

    #[test]
    fn push_keeps_order_and_weight() {
        let mut tree = SplayTree::new();
        tree.push(run("A"));
        tree.push(run("BB"));
        tree.push(run("CCC"));
        tree.push(run("DDDD"));

        assert_eq!(contents(&tree), "ABBCCCDDDD");
        assert_eq!(tree.total_weight(), 10);
        assert_eq!(tree.len(), 4);
        assert!(tree.check_weights());
    }

    #[test]
    fn find_returns_covering_node_and_offset() {
        let mut tree = SplayTree::new();
        let a = tree.push(run("A"));
        let b = tree.push(run("BB"));
        let c = tree.push(run("CCC"));
        let d = tree.push(run("DDDD"));

        assert_eq!(tree.find(0), Some((a, 0)));
        assert_eq!(tree.find(1), Some((b, 0)));
        assert_eq!(tree.find(2), Some((b, 1)));
        assert_eq!(tree.find(5), Some((c, 2)));
        assert_eq!(tree.find(9), Some((d, 3)));
        assert_eq!(tree.find(10), None);

        // find splays the hit to the root
        tree.find(2);
        assert_eq!(tree.root(), Some(b));
        assert!(tree.check_weights());
    }

    #[test]
    fn find_skips_zero_weight_nodes() {
        let mut tree = SplayTree::new();
        let a = tree.push(run("A"));
        let b = tree.push(run("BB"));
        let c = tree.push(run("CCC"));

        tree.update(b, |r| r.removed = true);
        assert_eq!(tree.total_weight(), 4);
        assert_eq!(tree.find(0), Some((a, 0)));
        assert_eq!(tree.find(1), Some((c, 0)));
        assert!(tree.check_weights());
    }

    #[test]
    fn insert_after_and_front() {
        let mut tree = SplayTree::new();
        let a = tree.push(run("a"));
        let c = tree.push(run("c"));
        tree.insert_after(Some(a), run("b"));
        tree.insert_after(None, run("_"));
        tree.insert_after(Some(c), run("d"));

        assert_eq!(contents(&tree), "_abcd");
        assert!(tree.check_weights());
    }

    #[test]
    fn index_of_counts_weight_before_node() {
        let mut tree = SplayTree::new();
        let a = tree.push(run("A"));
        let b = tree.push(run("BB"));
        let c = tree.push(run("CCC"));

        assert_eq!(tree.index_of(a), Some(0));
        assert_eq!(tree.index_of(b), Some(1));
        assert_eq!(tree.index_of(c), Some(3));

        tree.update(b, |r| r.removed = true);
        assert_eq!(tree.index_of(c), Some(1));
    }

    #[test]
    fn delete_relinks_neighbours() {
        let mut tree = SplayTree::new();
        let a = tree.push(run("A"));
        let b = tree.push(run("BB"));
        let c = tree.push(run("CCC"));

        assert_eq!(tree.delete(b), Some(run("BB")));
        assert_eq!(contents(&tree), "ACCC");
        assert_eq!(tree.next(a), Some(c));
        assert_eq!(tree.prev(c), Some(a));
        assert!(tree.check_weights());

        // Deleting twice is harmless
        assert_eq!(tree.delete(b), None);

        tree.delete(a);
        tree.delete(c);
        assert!(tree.is_empty());
        assert_eq!(tree.total_weight(), 0);
        assert_eq!(tree.first(), None);
        assert!(tree.check_weights());
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tree = SplayTree::new();
        let a = tree.push(run("A"));
        tree.push(run("B"));
        tree.delete(a);
        let c = tree.push(run("C"));
        assert_eq!(a, c);
        assert_eq!(contents(&tree), "BC");
        assert!(tree.check_weights());
    }

    #[test]
    fn split_off_and_append() {
        let mut tree = SplayTree::new();
        tree.push(run("ab"));
        tree.push(run("cd"));
        tree.push(run("ef"));

        // "ab" starts before 3 and "cd" straddles it, both stay
        let right = tree.split_off(3);
        assert_eq!(contents(&tree), "abcd");
        assert_eq!(contents(&right), "ef");
        assert!(tree.check_weights());
        assert!(right.check_weights());

        tree.append(right);
        assert_eq!(contents(&tree), "abcdef");
        assert_eq!(tree.total_weight(), 6);
        assert!(tree.check_weights());
    }

    #[test]
    fn split_off_edges() {
        let mut tree = SplayTree::new();
        tree.push(run("ab"));
        tree.push(run("cd"));

        let all = tree.split_off(0);
        assert!(tree.is_empty());
        assert_eq!(contents(&all), "abcd");

        let mut tree = all;
        let none = tree.split_off(10);
        assert!(none.is_empty());
        assert_eq!(contents(&tree), "abcd");
    }

    #[test]
    fn split_off_sends_trailing_tombstones_right() {
        let mut tree = SplayTree::new();
        tree.push(run("ab"));
        let gone = tree.push(run("xy"));
        tree.push(run("cd"));
        tree.update(gone, |r| r.removed = true);

        let right = tree.split_off(2);
        assert_eq!(tree.len(), 1);
        assert_eq!(right.len(), 2);
        assert_eq!(contents(&right), "cd");
    }
}
