//! Operations that mutate a document.
//!
//! An operation is a value object naming its parent container by creation
//! ticket, whatever tickets identify its targets, the ticket it was executed
//! at, and its payload. The same operation is executed once by its author and
//! then, unmodified, by every other replica in whatever order they receive it.
//!
//! Every `execute` follows the same steps:
//! 1. Resolve the parent and check its variant (`TypeMismatch`,
//!    `TargetNotFound`).
//! 2. Deep copy the payload so no element is shared between a log and a
//!    document.
//! 3. Delegate to the container, propagating its error unchanged.
//! 4. Register new elements, tombstones and containers holding garbage.
//!
//! Executing the same operation twice leaves the document as executing it
//! once: containers recognise tickets they already hold.

use smallvec::smallvec;
use tracing::debug;

use super::Element;
use super::Tombstones;
use super::primitives::ActorId;
use super::primitives::Ticket;
use super::root::Root;
use super::text::MaxCreatedAtByActor;
use super::text::TextPos;
use super::tree::FlatNode;
use crate::error::Error;
use crate::error::Result;

fn register_tombstones(root: &mut Root, tombstones: Tombstones) {
    for ticket in tombstones {
        root.register_removed_element(ticket);
    }
}

/// Insert `value` into an array in a new slot after the slot created at
/// `prev_created_at`.
#[derive(Clone, Debug)]
pub struct Add {
    pub parent_created_at: Ticket,
    pub prev_created_at: Ticket,
    pub value: Element,
    pub executed_at: Ticket,
}

impl Add {
    pub fn execute(&self, root: &mut Root) -> Result<()> {
        root.resolve(&self.parent_created_at)?.as_array()?;
        let value = self.value.deep_copy();
        let entries = Root::entries(&value, self.parent_created_at);
        root.check_entries(&value, &entries)?;

        root.resolve_mut(&self.parent_created_at)?
            .as_array_mut()?
            .insert_after(&self.prev_created_at, value, &self.executed_at)?;

        root.register_entries(entries);
        return Ok(());
    }
}

/// Set `key` of an object to `value`.
#[derive(Clone, Debug)]
pub struct Set {
    pub parent_created_at: Ticket,
    pub key: String,
    pub value: Element,
    pub executed_at: Ticket,
}

impl Set {
    pub fn execute(&self, root: &mut Root) -> Result<()> {
        root.resolve(&self.parent_created_at)?.as_object()?;
        let value = self.value.deep_copy();
        let entries = Root::entries(&value, self.parent_created_at);
        root.check_entries(&value, &entries)?;

        let tombstones = root
            .resolve_mut(&self.parent_created_at)?
            .as_object_mut()?
            .set(&self.key, value);

        root.register_entries(entries);
        register_tombstones(root, tombstones);
        return Ok(());
    }
}

/// Tombstone the element created at `created_at` in an array or object.
#[derive(Clone, Debug)]
pub struct Remove {
    pub parent_created_at: Ticket,
    pub created_at: Ticket,
    pub executed_at: Ticket,
}

impl Remove {
    pub fn execute(&self, root: &mut Root) -> Result<()> {
        let tombstones = match root.resolve_mut(&self.parent_created_at)? {
            Element::Array(array) => array.delete_by_created_at(&self.created_at, &self.executed_at)?,
            Element::Object(object) => {
                if object.delete_by_created_at(&self.created_at, &self.executed_at)? {
                    smallvec![self.created_at]
                } else {
                    Tombstones::new()
                }
            }
            other => return Err(Error::mismatch("array or object", other.kind())),
        };
        register_tombstones(root, tombstones);
        return Ok(());
    }
}

/// Replace the array element created at `created_at` with `value`.
#[derive(Clone, Debug)]
pub struct SetByIndex {
    pub parent_created_at: Ticket,
    pub created_at: Ticket,
    /// Slot the target was in when the author replaced it.
    pub positioned_at: Ticket,
    pub value: Element,
    pub executed_at: Ticket,
}

impl SetByIndex {
    pub fn execute(&self, root: &mut Root) -> Result<()> {
        root.resolve(&self.parent_created_at)?.as_array()?;
        let value = self.value.deep_copy();
        let entries = Root::entries(&value, self.parent_created_at);
        root.check_entries(&value, &entries)?;

        let tombstones = root
            .resolve_mut(&self.parent_created_at)?
            .as_array_mut()?
            .set_by_index(&self.created_at, &self.positioned_at, value, &self.executed_at)?;

        // The replaced element keeps its own ticket and is collected like
        // any other tombstone.
        root.register_entries(entries);
        register_tombstones(root, tombstones);
        return Ok(());
    }
}

/// Move the array element created at `created_at` into a new slot after the
/// slot created at `prev_created_at`.
#[derive(Clone, Debug)]
pub struct Move {
    pub parent_created_at: Ticket,
    pub prev_created_at: Ticket,
    pub created_at: Ticket,
    pub executed_at: Ticket,
}

impl Move {
    pub fn execute(&self, root: &mut Root) -> Result<()> {
        let array = root.resolve_mut(&self.parent_created_at)?.as_array_mut()?;
        array.move_after(&self.prev_created_at, &self.created_at, &self.executed_at)?;
        if array.garbage_len() > 0 {
            root.register_gc_container(self.parent_created_at);
        }
        return Ok(());
    }
}

/// Replace the text range `[from, to)` with `content`.
#[derive(Clone, Debug)]
pub struct Edit {
    pub parent_created_at: Ticket,
    pub from: TextPos,
    pub to: TextPos,
    pub content: String,
    /// Newest run per actor the author removed; `None` until executed locally.
    pub max_created_at_by_actor: Option<MaxCreatedAtByActor>,
    pub executed_at: Ticket,
}

impl Edit {
    /// Execute and return the caret plus the runs removed per actor.
    pub(crate) fn apply(&self, root: &mut Root) -> Result<(TextPos, MaxCreatedAtByActor)> {
        let text = root.resolve_mut(&self.parent_created_at)?.as_text_mut()?;
        let result = text.edit(
            &self.from,
            &self.to,
            &self.content,
            &self.executed_at,
            self.max_created_at_by_actor.as_ref(),
        )?;
        if text.garbage_len() > 0 {
            root.register_gc_container(self.parent_created_at);
        }
        return Ok(result);
    }

    pub fn execute(&self, root: &mut Root) -> Result<()> {
        self.apply(root)?;
        return Ok(());
    }
}

/// Insert a fragment of nodes into a tree.
#[derive(Clone, Debug)]
pub struct TreeInsert {
    pub parent_created_at: Ticket,
    /// Node receiving the fragment.
    pub node_parent: Ticket,
    /// Sibling to insert after; `None` for the front.
    pub prev: Option<Ticket>,
    /// Pre-order forest.
    pub fragment: Vec<FlatNode>,
    pub executed_at: Ticket,
}

impl TreeInsert {
    pub fn execute(&self, root: &mut Root) -> Result<()> {
        let tree = root.resolve_mut(&self.parent_created_at)?.as_tree_mut()?;
        tree.insert_after(&self.node_parent, self.prev.as_ref(), &self.fragment, &self.executed_at)?;
        if tree.garbage_len() > 0 {
            root.register_gc_container(self.parent_created_at);
        }
        return Ok(());
    }
}

/// Tombstone a tree node and its descendants.
#[derive(Clone, Debug)]
pub struct TreeRemove {
    pub parent_created_at: Ticket,
    pub node: Ticket,
    pub executed_at: Ticket,
}

impl TreeRemove {
    pub fn execute(&self, root: &mut Root) -> Result<()> {
        let tree = root.resolve_mut(&self.parent_created_at)?.as_tree_mut()?;
        tree.remove(&self.node, &self.executed_at)?;
        if tree.garbage_len() > 0 {
            root.register_gc_container(self.parent_created_at);
        }
        return Ok(());
    }
}

/// Any operation.
#[derive(Clone, Debug)]
pub enum Operation {
    Add(Add),
    Set(Set),
    Remove(Remove),
    SetByIndex(SetByIndex),
    Move(Move),
    Edit(Edit),
    TreeInsert(TreeInsert),
    TreeRemove(TreeRemove),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        return match self {
            Operation::Add(_) => "add",
            Operation::Set(_) => "set",
            Operation::Remove(_) => "remove",
            Operation::SetByIndex(_) => "set_by_index",
            Operation::Move(_) => "move",
            Operation::Edit(_) => "edit",
            Operation::TreeInsert(_) => "tree_insert",
            Operation::TreeRemove(_) => "tree_remove",
        };
    }

    pub fn execute(&self, root: &mut Root) -> Result<()> {
        match self {
            Operation::Add(op) => op.execute(root)?,
            Operation::Set(op) => op.execute(root)?,
            Operation::Remove(op) => op.execute(root)?,
            Operation::SetByIndex(op) => op.execute(root)?,
            Operation::Move(op) => op.execute(root)?,
            Operation::Edit(op) => op.execute(root)?,
            Operation::TreeInsert(op) => op.execute(root)?,
            Operation::TreeRemove(op) => op.execute(root)?,
        }
        debug!(op = self.name(), executed_at = %self.executed_at(), "applied operation");
        return Ok(());
    }

    pub fn executed_at(&self) -> Ticket {
        return match self {
            Operation::Add(op) => op.executed_at,
            Operation::Set(op) => op.executed_at,
            Operation::Remove(op) => op.executed_at,
            Operation::SetByIndex(op) => op.executed_at,
            Operation::Move(op) => op.executed_at,
            Operation::Edit(op) => op.executed_at,
            Operation::TreeInsert(op) => op.executed_at,
            Operation::TreeRemove(op) => op.executed_at,
        };
    }

    fn executed_at_mut(&mut self) -> &mut Ticket {
        return match self {
            Operation::Add(op) => &mut op.executed_at,
            Operation::Set(op) => &mut op.executed_at,
            Operation::Remove(op) => &mut op.executed_at,
            Operation::SetByIndex(op) => &mut op.executed_at,
            Operation::Move(op) => &mut op.executed_at,
            Operation::Edit(op) => &mut op.executed_at,
            Operation::TreeInsert(op) => &mut op.executed_at,
            Operation::TreeRemove(op) => &mut op.executed_at,
        };
    }

    /// The container this operation targets.
    pub fn parent_created_at(&self) -> Ticket {
        return match self {
            Operation::Add(op) => op.parent_created_at,
            Operation::Set(op) => op.parent_created_at,
            Operation::Remove(op) => op.parent_created_at,
            Operation::SetByIndex(op) => op.parent_created_at,
            Operation::Move(op) => op.parent_created_at,
            Operation::Edit(op) => op.parent_created_at,
            Operation::TreeInsert(op) => op.parent_created_at,
            Operation::TreeRemove(op) => op.parent_created_at,
        };
    }

    /// Attribute the execution ticket to `actor`. Payload tickets are kept.
    pub fn set_actor(&mut self, actor: ActorId) {
        let executed_at = self.executed_at_mut();
        *executed_at = executed_at.with_actor(actor);
    }
}
