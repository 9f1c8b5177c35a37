//! Text sequence of tombstonable character runs.
//!
//! Each edit inserts its content as one run identified by the edit's ticket.
//! Runs split on demand when a later edit lands inside them; the right half
//! keeps the creation ticket and records its character offset, so every
//! character stays addressable as `(created_at, offset)` forever.
//!
//! Runs live in a splay tree weighted by character count (0 once removed),
//! plus an ordered index by id for resolving positions.
//!
//! Deletion is causal: an edit only tombstones runs its author had seen,
//! which the authoring replica records as the newest run ticket per actor
//! inside the edited range.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;
use tracing::trace;

use super::Meta;
use super::primitives::ActorId;
use super::primitives::NodeId;
use super::primitives::SplayTree;
use super::primitives::Ticket;
use super::primitives::Weighted;
use crate::error::Error;
use crate::error::Result;

/// Newest run ticket per actor, as seen by the author of an edit.
pub type MaxCreatedAtByActor = FxHashMap<ActorId, Ticket>;

/// Identity of a run: the inserting edit and the character offset into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextNodeId {
    pub created_at: Ticket,
    pub offset: u32,
}

impl TextNodeId {
    pub fn new(created_at: Ticket, offset: u32) -> TextNodeId {
        return TextNodeId { created_at, offset };
    }
}

/// A position: after `relative_offset` characters from the start of run `id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextPos {
    pub id: TextNodeId,
    pub relative_offset: u32,
}

impl TextPos {
    fn absolute(&self) -> u32 {
        return self.id.offset + self.relative_offset;
    }
}

/// A run of characters.
#[derive(Clone, Debug)]
pub struct TextNode {
    id: TextNodeId,
    content: String,
    /// Length in characters.
    len: u32,
    removed_at: Option<Ticket>,
}

impl TextNode {
    fn new(id: TextNodeId, content: &str) -> TextNode {
        return TextNode {
            id,
            content: content.to_owned(),
            len: content.chars().count() as u32,
            removed_at: None,
        };
    }

    pub fn id(&self) -> TextNodeId {
        return self.id;
    }

    pub fn content(&self) -> &str {
        return &self.content;
    }

    pub fn removed_at(&self) -> Option<Ticket> {
        return self.removed_at;
    }

    fn can_delete(&self, executed_at: &Ticket, max_created_at: &Ticket) -> bool {
        let created_at = self.id.created_at;
        if created_at.after(max_created_at) || !executed_at.after(&created_at) {
            return false;
        }
        return match self.removed_at {
            Some(removed_at) => executed_at.after(&removed_at),
            None => true,
        };
    }

    /// Keep the first `offset` characters, return the rest as a new run.
    fn split(&mut self, offset: u32) -> TextNode {
        let byte = self
            .content
            .char_indices()
            .nth(offset as usize)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len());
        let rest = self.content.split_off(byte);
        let right = TextNode {
            id: TextNodeId::new(self.id.created_at, self.id.offset + offset),
            content: rest,
            len: self.len - offset,
            removed_at: self.removed_at,
        };
        self.len = offset;
        return right;
    }
}

impl Weighted for TextNode {
    fn weight(&self) -> u64 {
        if self.removed_at.is_some() {
            return 0;
        }
        return self.len as u64;
    }
}

/// A replicated text.
#[derive(Clone, Debug)]
pub struct Text {
    pub(super) meta: Meta,
    runs: SplayTree<TextNode>,
    head: NodeId,
    by_id: BTreeMap<TextNodeId, NodeId>,
    removed: BTreeSet<TextNodeId>,
}

impl Text {
    pub fn new(created_at: Ticket) -> Text {
        let mut runs = SplayTree::new();
        let head_id = TextNodeId::new(Ticket::INITIAL, 0);
        let head = runs.push(TextNode::new(head_id, ""));
        let mut by_id = BTreeMap::new();
        by_id.insert(head_id, head);

        return Text {
            meta: Meta::new(created_at),
            runs,
            head,
            by_id,
            removed: BTreeSet::new(),
        };
    }

    /// Number of live characters.
    pub fn len(&self) -> usize {
        return self.runs.total_weight() as usize;
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Number of removed runs awaiting collection.
    pub fn garbage_len(&self) -> usize {
        return self.removed.len();
    }

    /// Every run in order, removed ones included.
    pub fn runs(&self) -> impl Iterator<Item = &TextNode> {
        let head = self.head;
        return self
            .runs
            .iter()
            .filter(move |(id, _)| *id != head)
            .map(|(_, node)| node);
    }

    /// Position of the boundary before the character at `index`.
    ///
    /// Boundaries are left-biased: they attach to the end of the preceding
    /// character's run.
    pub fn index_to_pos(&mut self, index: usize) -> Result<TextPos> {
        if index == 0 {
            return Ok(TextPos {
                id: TextNodeId::new(Ticket::INITIAL, 0),
                relative_offset: 0,
            });
        }
        let (id, offset) = self
            .runs
            .find(index as u64 - 1)
            .ok_or_else(|| Error::structural(format!("index {} beyond text length", index)))?;
        let node = self.runs.get(id).ok_or_else(|| Error::structural("dangling text run"))?;
        return Ok(TextPos {
            id: node.id,
            relative_offset: offset as u32 + 1,
        });
    }

    fn node_id(&self, id: &TextNodeId) -> Result<NodeId> {
        return self
            .by_id
            .get(id)
            .copied()
            .ok_or(Error::TargetNotFound(id.created_at));
    }

    fn split(&mut self, id: NodeId, offset: u32) -> Result<()> {
        let Some(len) = self.runs.get(id).map(|node| node.len) else {
            return Err(Error::structural("dangling text run"));
        };
        if offset == 0 || offset >= len {
            return Ok(());
        }
        let Some(right) = self.runs.update(id, |node| node.split(offset)) else {
            return Err(Error::structural("dangling text run"));
        };
        let right_id = right.id;
        let removed = right.removed_at.is_some();
        let new = self.runs.insert_after(Some(id), right);
        self.by_id.insert(right_id, new);
        if removed {
            self.removed.insert(right_id);
        }
        return Ok(());
    }

    /// Resolve `pos` to the run that ends right at it, splitting if needed,
    /// then walk past runs inserted after `executed_at`.
    fn find_node_with_split(&mut self, pos: &TextPos, executed_at: &Ticket) -> Result<NodeId> {
        let created_at = pos.id.created_at;
        let absolute = pos.absolute();

        let mut left = if absolute == 0 {
            if created_at != Ticket::INITIAL {
                return Err(Error::structural(format!(
                    "position before the start of run {}",
                    created_at
                )));
            }
            self.head
        } else {
            let below = TextNodeId::new(created_at, absolute);
            let floor = self
                .by_id
                .range(..below)
                .next_back()
                .filter(|(id, _)| id.created_at == created_at)
                .map(|(id, node)| (*id, *node));

            let reaches = |id: &TextNodeId, node: NodeId, runs: &SplayTree<TextNode>| {
                runs.get(node)
                    .is_some_and(|run| id.offset + run.len >= absolute)
            };

            match floor {
                Some((id, node)) if reaches(&id, node, &self.runs) => {
                    self.split(node, absolute - id.offset)?;
                    node
                }
                // The run ending here was collected; attach before its successor.
                _ => {
                    let next = self.node_id(&below)?;
                    self.runs
                        .prev(next)
                        .ok_or_else(|| Error::structural("run without predecessor"))?
                }
            }
        };

        while let Some(next) = self.runs.next(left) {
            match self.runs.get(next) {
                Some(run) if run.id.created_at.after(executed_at) => left = next,
                _ => break,
            }
        }
        return Ok(left);
    }

    /// Replace the range `[from, to)` with `content`.
    ///
    /// `max_created_at_by_actor` limits deletion to runs the author had seen;
    /// `None` means local execution, where every run in range is known.
    /// Returns the caret after the edit and the per-actor newest ticket of
    /// the runs this edit removed.
    pub fn edit(
        &mut self,
        from: &TextPos,
        to: &TextPos,
        content: &str,
        executed_at: &Ticket,
        max_created_at_by_actor: Option<&MaxCreatedAtByActor>,
    ) -> Result<(TextPos, MaxCreatedAtByActor)> {
        // Split at `to` first so `to_right` survives the split at `from`.
        let to_left = self.find_node_with_split(to, executed_at)?;
        let to_right = self.runs.next(to_left);
        let from_left = self.find_node_with_split(from, executed_at)?;

        let mut candidates = Vec::new();
        let mut cursor = self.runs.next(from_left);
        while let Some(id) = cursor {
            if Some(id) == to_right {
                break;
            }
            candidates.push(id);
            cursor = self.runs.next(id);
        }

        let mut removed_by_actor = MaxCreatedAtByActor::default();
        for id in candidates {
            let Some(run) = self.runs.get(id) else {
                continue;
            };
            let run_id = run.id;
            let actor = run_id.created_at.actor();
            let max_created_at = match max_created_at_by_actor {
                None => Ticket::MAX,
                Some(map) => map.get(&actor).copied().unwrap_or(Ticket::INITIAL),
            };
            if !run.can_delete(executed_at, &max_created_at) {
                continue;
            }

            self.runs.update(id, |run| run.removed_at = Some(*executed_at));
            self.removed.insert(run_id);
            let newest = removed_by_actor.entry(actor).or_insert(run_id.created_at);
            if run_id.created_at.after(newest) {
                *newest = run_id.created_at;
            }
        }

        let caret = if content.is_empty() {
            let run = self.runs.get(to_left).ok_or_else(|| Error::structural("dangling text run"))?;
            TextPos {
                id: run.id,
                relative_offset: run.len,
            }
        } else {
            let inserted = TextNodeId::new(*executed_at, 0);
            let node = TextNode::new(inserted, content);
            let len = node.len;
            if !self.by_id.contains_key(&inserted) {
                let id = self.runs.insert_after(Some(from_left), node);
                self.by_id.insert(inserted, id);
            }
            TextPos {
                id: inserted,
                relative_offset: len,
            }
        };

        return Ok((caret, removed_by_actor));
    }

    /// Physically drop removed runs whose removal every replica has seen.
    pub fn purge_removed_nodes_before(&mut self, min_synced: &Ticket) -> usize {
        let ready: Vec<(TextNodeId, NodeId)> = self
            .removed
            .iter()
            .filter_map(|id| {
                let node = *self.by_id.get(id)?;
                let removed_at = self.runs.get(node)?.removed_at?;
                (removed_at <= *min_synced).then_some((*id, node))
            })
            .collect();

        for (id, node) in &ready {
            self.runs.delete(*node);
            self.by_id.remove(id);
            self.removed.remove(id);
            trace!(created_at = %id.created_at, offset = id.offset, "purged text run");
        }
        return ready.len();
    }

    pub fn check_weights(&self) -> bool {
        return self.runs.check_weights();
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for run in self.runs().filter(|run| run.removed_at.is_none()) {
            f.write_str(&run.content)?;
        }
        return Ok(());
    }
}
