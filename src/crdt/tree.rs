//! Hierarchical element made of typed nodes.
//!
//! Nodes are identified by tickets and kept in a flat map; each node lists
//! its children in order, tombstones included. Concurrent inserts under the
//! same parent after the same sibling are ordered newest first, as in the
//! array.
//!
//! Text leaves carry type `"text"` and a value. Every other node is an
//! element node whose content is its children.
//!
//! For storage and transport a tree converts to a flat pre-order list where
//! each entry records its child count; `from_flat_nodes` rebuilds it.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use serde_json::json;
use tracing::trace;

use super::Meta;
use super::primitives::Ticket;
use crate::error::Error;
use crate::error::Result;

/// Node type of text leaves.
pub const TEXT_TYPE: &str = "text";

/// One node of a tree.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
    id: Ticket,
    node_type: String,
    value: Option<String>,
    parent: Option<Ticket>,
    children: Vec<Ticket>,
    removed_at: Option<Ticket>,
}

impl TreeNode {
    pub fn id(&self) -> Ticket {
        return self.id;
    }

    pub fn node_type(&self) -> &str {
        return &self.node_type;
    }

    pub fn value(&self) -> Option<&str> {
        return self.value.as_deref();
    }

    pub fn parent(&self) -> Option<Ticket> {
        return self.parent;
    }

    pub fn removed_at(&self) -> Option<Ticket> {
        return self.removed_at;
    }

    pub fn is_removed(&self) -> bool {
        return self.removed_at.is_some();
    }

    pub fn is_text(&self) -> bool {
        return self.node_type == TEXT_TYPE;
    }

    fn remove(&mut self, executed_at: &Ticket) -> bool {
        if !executed_at.after(&self.id) {
            return false;
        }
        match self.removed_at {
            Some(removed_at) if !executed_at.after(&removed_at) => false,
            _ => {
                self.removed_at = Some(*executed_at);
                true
            }
        }
    }
}

/// A node in pre-order flat form.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatNode {
    pub id: Ticket,
    pub node_type: String,
    pub value: Option<String>,
    /// Number of direct children, tombstones included.
    pub child_count: usize,
    pub removed_at: Option<Ticket>,
}

impl FlatNode {
    /// An element node with `child_count` children following it.
    pub fn element(id: Ticket, node_type: &str, child_count: usize) -> FlatNode {
        return FlatNode {
            id,
            node_type: node_type.to_owned(),
            value: None,
            child_count,
            removed_at: None,
        };
    }

    /// A text leaf.
    pub fn text(id: Ticket, value: &str) -> FlatNode {
        return FlatNode {
            id,
            node_type: TEXT_TYPE.to_owned(),
            value: Some(value.to_owned()),
            child_count: 0,
            removed_at: None,
        };
    }

    fn into_node(self, parent: Option<Ticket>) -> TreeNode {
        return TreeNode {
            id: self.id,
            node_type: self.node_type,
            value: self.value,
            parent,
            children: Vec::with_capacity(self.child_count),
            removed_at: self.removed_at,
        };
    }
}

/// Parent index of each entry of a pre-order forest, `None` for top-level nodes.
fn parent_indices(flat: &[FlatNode]) -> Result<Vec<Option<usize>>> {
    let mut parents = Vec::with_capacity(flat.len());
    // (index, children still expected)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for (i, node) in flat.iter().enumerate() {
        if node.node_type == TEXT_TYPE && (node.child_count > 0 || node.value.is_none()) {
            return Err(Error::structural(format!("text node {} must be a leaf with a value", node.id)));
        }
        while matches!(stack.last(), Some((_, 0))) {
            stack.pop();
        }
        let parent = match stack.last_mut() {
            Some((p, remaining)) => {
                *remaining -= 1;
                Some(*p)
            }
            None => None,
        };
        parents.push(parent);
        stack.push((i, node.child_count));
    }

    if stack.iter().any(|(_, remaining)| *remaining > 0) {
        return Err(Error::structural("flat node list ends before all children"));
    }
    return Ok(parents);
}

/// A replicated tree.
#[derive(Clone, Debug)]
pub struct Tree {
    pub(super) meta: Meta,
    root: Ticket,
    nodes: FxHashMap<Ticket, TreeNode>,
    removed: BTreeSet<Ticket>,
}

impl Tree {
    /// A tree holding only its root node, which shares `created_at`.
    pub fn new(created_at: Ticket, root_type: &str) -> Tree {
        let root = FlatNode::element(created_at, root_type, 0).into_node(None);
        let mut nodes = FxHashMap::default();
        nodes.insert(created_at, root);
        return Tree {
            meta: Meta::new(created_at),
            root: created_at,
            nodes,
            removed: BTreeSet::new(),
        };
    }

    /// Rebuild a tree from its pre-order flat form.
    pub fn from_flat_nodes(created_at: Ticket, flat: &[FlatNode]) -> Result<Tree> {
        let Some(first) = flat.first() else {
            return Err(Error::structural("flat node list is empty"));
        };
        if first.id != created_at {
            return Err(Error::structural(format!(
                "root node {} does not match tree {}",
                first.id, created_at
            )));
        }
        if first.removed_at.is_some() {
            return Err(Error::structural(format!("root node {} cannot be removed", first.id)));
        }

        let parents = parent_indices(flat)?;
        if parents.iter().skip(1).any(Option::is_none) {
            return Err(Error::structural("flat node list holds more than one root"));
        }

        let mut tree = Tree {
            meta: Meta::new(created_at),
            root: created_at,
            nodes: FxHashMap::default(),
            removed: BTreeSet::new(),
        };
        for (node, parent) in flat.iter().zip(parents) {
            let parent = parent.map(|p| flat[p].id);
            if tree.nodes.contains_key(&node.id) {
                return Err(Error::structural(format!("duplicate node {}", node.id)));
            }
            tree.add_node(node.clone().into_node(parent));
            if let Some(parent) = parent {
                if let Some(p) = tree.nodes.get_mut(&parent) {
                    p.children.push(node.id);
                }
            }
        }
        return Ok(tree);
    }

    fn add_node(&mut self, node: TreeNode) {
        if node.is_removed() {
            self.removed.insert(node.id);
        }
        self.nodes.insert(node.id, node);
    }

    /// Pre-order flat form, tombstones included.
    pub fn to_flat_nodes(&self) -> Vec<FlatNode> {
        let mut flat = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            flat.push(FlatNode {
                id: node.id,
                node_type: node.node_type.clone(),
                value: node.value.clone(),
                child_count: node.children.len(),
                removed_at: node.removed_at,
            });
            stack.extend(node.children.iter().rev().copied());
        }
        return flat;
    }

    pub fn root(&self) -> &TreeNode {
        // The root node is never purged.
        return &self.nodes[&self.root];
    }

    pub fn node(&self, id: &Ticket) -> Option<&TreeNode> {
        return self.nodes.get(id);
    }

    /// Live children of a node.
    pub fn children(&self, id: &Ticket) -> impl Iterator<Item = &TreeNode> {
        return self
            .nodes
            .get(id)
            .into_iter()
            .flat_map(|node| node.children.iter())
            .filter_map(|child| self.nodes.get(child))
            .filter(|child| !child.is_removed());
    }

    /// Follow live child indices down from the root.
    pub fn node_at_path(&self, path: &[usize]) -> Option<&TreeNode> {
        let mut node = self.root();
        for &index in path {
            node = self.children(&node.id).nth(index)?;
        }
        return Some(node);
    }

    /// Number of live nodes reachable from the root, the root included.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend(self.children(&id).map(TreeNode::id));
        }
        return count;
    }

    /// Number of removed nodes awaiting collection.
    pub fn garbage_len(&self) -> usize {
        return self.removed.len();
    }

    /// Insert a fragment (a pre-order forest) under `parent` after sibling
    /// `prev`, or at the front when `prev` is None.
    pub fn insert_after(
        &mut self,
        parent: &Ticket,
        prev: Option<&Ticket>,
        fragment: &[FlatNode],
        executed_at: &Ticket,
    ) -> Result<()> {
        let Some(first) = fragment.first() else {
            return Err(Error::structural("empty tree fragment"));
        };
        let parent_removed_at = match self.nodes.get(parent) {
            Some(node) if node.is_text() => {
                return Err(Error::structural(format!("text node {} cannot have children", parent)));
            }
            Some(node) => node.removed_at,
            None => return Err(Error::TargetNotFound(*parent)),
        };
        if self.nodes.contains_key(&first.id) {
            return Ok(());
        }
        if let Some(taken) = fragment.iter().find(|node| self.nodes.contains_key(&node.id)) {
            return Err(Error::TicketCollision(taken.id));
        }
        let parents = parent_indices(fragment)?;

        let siblings = &self.nodes[parent].children;
        let mut index = match prev {
            None => 0,
            Some(prev) => {
                let position = siblings
                    .iter()
                    .position(|id| id == prev)
                    .ok_or(Error::TargetNotFound(*prev))?;
                position + 1
            }
        };
        while index < siblings.len() && siblings[index].after(executed_at) {
            index += 1;
        }

        let mut top_level = Vec::new();
        for (node, owner) in fragment.iter().zip(parents) {
            let owner = owner.map(|p| fragment[p].id);
            let mut node = node.clone().into_node(Some(owner.unwrap_or(*parent)));
            if let Some(removed_at) = parent_removed_at {
                node.remove(&removed_at);
            }
            match owner {
                Some(owner) => {
                    if let Some(o) = self.nodes.get_mut(&owner) {
                        o.children.push(node.id);
                    }
                }
                None => top_level.push(node.id),
            }
            self.add_node(node);
        }

        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.splice(index..index, top_level);
        }
        return Ok(());
    }

    /// Tombstone a node and its descendants. Returns how many markers changed.
    pub fn remove(&mut self, id: &Ticket, executed_at: &Ticket) -> Result<usize> {
        if *id == self.root {
            return Err(Error::structural("the root node cannot be removed"));
        }
        if !self.nodes.contains_key(id) {
            return Err(Error::TargetNotFound(*id));
        }

        let mut changed = 0;
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&current) else {
                continue;
            };
            if node.remove(executed_at) {
                changed += 1;
                self.removed.insert(current);
            }
            stack.extend(node.children.iter().copied());
        }
        return Ok(changed);
    }

    /// Physically drop removed nodes whose removal every replica has seen.
    /// A node goes only once none of its children remain.
    pub fn purge_removed_nodes_before(&mut self, min_synced: &Ticket) -> usize {
        let mut purged = 0;
        loop {
            let ready: Vec<Ticket> = self
                .removed
                .iter()
                .filter(|id| **id != self.root)
                .filter(|id| {
                    self.nodes.get(id).is_some_and(|node| {
                        node.children.is_empty()
                            && node.removed_at.is_some_and(|removed_at| removed_at <= *min_synced)
                    })
                })
                .copied()
                .collect();
            if ready.is_empty() {
                break;
            }

            for id in ready {
                self.removed.remove(&id);
                let Some(node) = self.nodes.remove(&id) else {
                    continue;
                };
                if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
                    parent.children.retain(|child| *child != id);
                }
                trace!(node = %id, "purged tree node");
                purged += 1;
            }
        }
        return purged;
    }

    /// XML view of the live nodes.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(self.root(), &mut out);
        return out;
    }

    fn write_xml(&self, node: &TreeNode, out: &mut String) {
        if node.is_text() {
            out.push_str(node.value().unwrap_or_default());
            return;
        }
        out.push('<');
        out.push_str(&node.node_type);
        out.push('>');
        for child in self.children(&node.id) {
            self.write_xml(child, out);
        }
        out.push_str("</");
        out.push_str(&node.node_type);
        out.push('>');
    }

    /// JSON view of the live nodes.
    pub fn to_json(&self) -> Json {
        return self.node_json(self.root());
    }

    fn node_json(&self, node: &TreeNode) -> Json {
        if node.is_text() {
            return json!({ "type": TEXT_TYPE, "value": node.value().unwrap_or_default() });
        }
        let children: Vec<Json> = self.children(&node.id).map(|child| self.node_json(child)).collect();
        return json!({ "type": node.node_type, "children": children });
    }
}
