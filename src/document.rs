//! A replica of one document.
//!
//! The document owns the root, the Lamport clock and the local actor. Local
//! changes go through the builders below: each issues a fresh ticket,
//! executes the resulting operation and hands it back for broadcast. Remote
//! operations come in through `apply`.
//!
//! Every value created by a builder is stamped with the ticket of the
//! operation that created it, so `op.executed_at()` names the new element.

use serde_json::Value as Json;

use crate::crdt::Element;
use crate::crdt::op::Add;
use crate::crdt::op::Edit;
use crate::crdt::op::Move;
use crate::crdt::op::Operation;
use crate::crdt::op::Remove;
use crate::crdt::op::Set;
use crate::crdt::op::SetByIndex;
use crate::crdt::op::TreeInsert;
use crate::crdt::op::TreeRemove;
use crate::crdt::primitives::ActorId;
use crate::crdt::primitives::LamportClock;
use crate::crdt::primitives::Ticket;
use crate::crdt::root::Root;
use crate::crdt::tree::FlatNode;
use crate::error::Error;
use crate::error::Result;

/// Per-document settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Skip garbage collection entirely; tombstones are kept forever.
    pub disable_gc: bool,
}

/// A local replica.
#[derive(Clone, Debug)]
pub struct Document {
    actor: ActorId,
    clock: LamportClock,
    root: Root,
    options: DocumentOptions,
}

impl Document {
    pub fn new(actor: ActorId) -> Document {
        return Self::with_options(actor, DocumentOptions::default());
    }

    pub fn with_options(actor: ActorId, options: DocumentOptions) -> Document {
        return Document {
            actor,
            clock: LamportClock::new(),
            root: Root::new(),
            options,
        };
    }

    pub fn actor(&self) -> ActorId {
        return self.actor;
    }

    pub fn options(&self) -> DocumentOptions {
        return self.options;
    }

    pub fn root(&self) -> &Root {
        return &self.root;
    }

    /// A ticket later than everything this replica has issued or seen.
    pub fn issue_ticket(&mut self) -> Ticket {
        return self.clock.next(self.actor);
    }

    /// Apply an operation received from another replica.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        self.clock.observe(&op.executed_at());
        return op.execute(&mut self.root);
    }

    /// Purge tombstones every replica has seen. Returns what was collected.
    pub fn garbage_collect(&mut self, min_synced: &Ticket) -> usize {
        if self.options.disable_gc {
            return 0;
        }
        return self.root.garbage_collect(min_synced);
    }

    pub fn garbage_len(&self) -> usize {
        return self.root.garbage_len();
    }

    pub fn find(&self, created_at: &Ticket) -> Option<&Element> {
        return self.root.find(created_at);
    }

    /// Live value of a top-level key.
    pub fn get(&self, key: &str) -> Option<&Element> {
        return self.root.object().as_object().ok()?.get(key);
    }

    pub fn snapshot(&self) -> Json {
        return self.root.snapshot();
    }

    pub fn to_json(&self) -> String {
        return self.snapshot().to_string();
    }

    fn execute_local(&mut self, op: Operation) -> Result<Operation> {
        op.execute(&mut self.root)?;
        return Ok(op);
    }

    fn created_at_by_index(&mut self, array: &Ticket, index: usize) -> Result<Ticket> {
        return self
            .root
            .resolve_mut(array)?
            .as_array_mut()?
            .created_at_by_index(index);
    }

    fn positioned_at_by_index(&mut self, array: &Ticket, index: usize) -> Result<Ticket> {
        return self
            .root
            .resolve_mut(array)?
            .as_array_mut()?
            .positioned_at_by_index(index);
    }

    /// Insert a new element at `index`. `make` builds it from its ticket.
    pub fn array_insert(
        &mut self,
        array: Ticket,
        index: usize,
        make: impl FnOnce(Ticket) -> Element,
    ) -> Result<Operation> {
        let prev_created_at = match index {
            0 => {
                self.root.resolve(&array)?.as_array()?;
                Ticket::INITIAL
            }
            _ => self.positioned_at_by_index(&array, index - 1)?,
        };
        let executed_at = self.issue_ticket();
        return self.execute_local(Operation::Add(Add {
            parent_created_at: array,
            prev_created_at,
            value: make(executed_at),
            executed_at,
        }));
    }

    /// Append a new element.
    pub fn array_push(&mut self, array: Ticket, make: impl FnOnce(Ticket) -> Element) -> Result<Operation> {
        let prev_created_at = self.root.resolve(&array)?.as_array()?.last_created_at();
        let executed_at = self.issue_ticket();
        return self.execute_local(Operation::Add(Add {
            parent_created_at: array,
            prev_created_at,
            value: make(executed_at),
            executed_at,
        }));
    }

    pub fn array_delete(&mut self, array: Ticket, index: usize) -> Result<Operation> {
        let created_at = self.created_at_by_index(&array, index)?;
        let executed_at = self.issue_ticket();
        return self.execute_local(Operation::Remove(Remove {
            parent_created_at: array,
            created_at,
            executed_at,
        }));
    }

    /// Replace the element at `index` with a new one.
    pub fn array_set(
        &mut self,
        array: Ticket,
        index: usize,
        make: impl FnOnce(Ticket) -> Element,
    ) -> Result<Operation> {
        let created_at = self.created_at_by_index(&array, index)?;
        let positioned_at = self.positioned_at_by_index(&array, index)?;
        let executed_at = self.issue_ticket();
        return self.execute_local(Operation::SetByIndex(SetByIndex {
            parent_created_at: array,
            created_at,
            positioned_at,
            value: make(executed_at),
            executed_at,
        }));
    }

    /// Move the element at `index` after the element at `prev`, or to the
    /// front when `prev` is None. Indices refer to the array before the move.
    pub fn array_move_after(&mut self, array: Ticket, prev: Option<usize>, index: usize) -> Result<Operation> {
        let prev_created_at = match prev {
            Some(prev) => self.positioned_at_by_index(&array, prev)?,
            None => Ticket::INITIAL,
        };
        let created_at = self.created_at_by_index(&array, index)?;
        let executed_at = self.issue_ticket();
        return self.execute_local(Operation::Move(Move {
            parent_created_at: array,
            prev_created_at,
            created_at,
            executed_at,
        }));
    }

    /// Set `key` of an object to a new element.
    pub fn object_set(
        &mut self,
        object: Ticket,
        key: &str,
        make: impl FnOnce(Ticket) -> Element,
    ) -> Result<Operation> {
        self.root.resolve(&object)?.as_object()?;
        let executed_at = self.issue_ticket();
        return self.execute_local(Operation::Set(Set {
            parent_created_at: object,
            key: key.to_owned(),
            value: make(executed_at),
            executed_at,
        }));
    }

    pub fn object_delete(&mut self, object: Ticket, key: &str) -> Result<Operation> {
        let created_at = self
            .root
            .resolve(&object)?
            .as_object()?
            .get(key)
            .map(Element::created_at)
            .ok_or_else(|| Error::structural(format!("no live key {:?}", key)))?;
        let executed_at = self.issue_ticket();
        return self.execute_local(Operation::Remove(Remove {
            parent_created_at: object,
            created_at,
            executed_at,
        }));
    }

    /// Replace the characters `[from, to)` of a text with `content`.
    pub fn text_edit(&mut self, text: Ticket, from: usize, to: usize, content: &str) -> Result<Operation> {
        if from > to {
            return Err(Error::structural(format!("edit range {}..{} is reversed", from, to)));
        }
        let (from, to) = {
            let text = self.root.resolve_mut(&text)?.as_text_mut()?;
            (text.index_to_pos(from)?, text.index_to_pos(to)?)
        };
        let executed_at = self.issue_ticket();
        let mut edit = Edit {
            parent_created_at: text,
            from,
            to,
            content: content.to_owned(),
            max_created_at_by_actor: None,
            executed_at,
        };
        let (_, removed) = edit.apply(&mut self.root)?;
        edit.max_created_at_by_actor = Some(removed);
        return Ok(Operation::Edit(edit));
    }

    /// Insert a fragment as the `index`-th live child of the node at `path`.
    /// Fragment nodes are restamped with tickets of this operation.
    pub fn tree_insert(
        &mut self,
        tree: Ticket,
        path: &[usize],
        index: usize,
        mut fragment: Vec<FlatNode>,
    ) -> Result<Operation> {
        let (node_parent, prev) = {
            let target = self.root.resolve(&tree)?.as_tree()?;
            let parent = target
                .node_at_path(path)
                .ok_or_else(|| Error::structural(format!("no tree node at {:?}", path)))?;
            let prev = match index {
                0 => None,
                _ => Some(
                    target
                        .children(&parent.id())
                        .nth(index - 1)
                        .ok_or_else(|| Error::structural(format!("child index {} out of bounds", index)))?
                        .id(),
                ),
            };
            (parent.id(), prev)
        };

        let executed_at = self.issue_ticket();
        for (i, node) in fragment.iter_mut().enumerate() {
            node.id = executed_at.with_delimiter(i as u32);
            node.removed_at = None;
        }
        return self.execute_local(Operation::TreeInsert(TreeInsert {
            parent_created_at: tree,
            node_parent,
            prev,
            fragment,
            executed_at,
        }));
    }

    /// Remove the tree node at `path` with its descendants.
    pub fn tree_remove(&mut self, tree: Ticket, path: &[usize]) -> Result<Operation> {
        let node = self
            .root
            .resolve(&tree)?
            .as_tree()?
            .node_at_path(path)
            .map(|node| node.id())
            .ok_or_else(|| Error::structural(format!("no tree node at {:?}", path)))?;
        let executed_at = self.issue_ticket();
        return self.execute_local(Operation::TreeRemove(TreeRemove {
            parent_created_at: tree,
            node,
            executed_at,
        }));
    }
}
