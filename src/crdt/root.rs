//! Root registry and garbage collection.
//!
//! The root owns the document's top-level object (stamped `Ticket::INITIAL`)
//! and indexes every element below it by creation ticket. Elements are owned
//! by their containers; the registry records each element's parent so that
//! any ticket resolves by walking its ancestry down from the root, one hash
//! lookup per level. Resolution is therefore O(depth) rather than a single
//! lookup; documents are shallow and this keeps ownership in one place.
//!
//! It also tracks what garbage collection needs:
//! - tombstoned elements, purged once every replica has seen the removal
//! - texts and trees holding removed nodes, arrays holding vacant slots
//!
//! The minimum synced ticket driving collection is computed elsewhere.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use serde_json::Value as Json;
use smallvec::SmallVec;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Element;
use super::primitives::Ticket;
use crate::error::Error;
use crate::error::Result;

/// Registration record for one element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Entry {
    pub created_at: Ticket,
    pub parent: Ticket,
    pub removed: bool,
    pub has_garbage: bool,
}

/// Tickets from the root's child down to an element.
pub type Ancestry = SmallVec<[Ticket; 8]>;

/// The document root and its element index.
#[derive(Clone, Debug)]
pub struct Root {
    object: Element,
    parents: FxHashMap<Ticket, Ticket>,
    removed: BTreeSet<Ticket>,
    gc_containers: FxHashSet<Ticket>,
}

impl Default for Root {
    fn default() -> Self {
        return Self::new();
    }
}

impl Root {
    pub fn new() -> Root {
        return Root {
            object: Element::object(Ticket::INITIAL),
            parents: FxHashMap::default(),
            removed: BTreeSet::new(),
            gc_containers: FxHashSet::default(),
        };
    }

    /// The top-level object.
    pub fn object(&self) -> &Element {
        return &self.object;
    }

    /// Number of registered elements, the root excluded.
    pub fn element_count(&self) -> usize {
        return self.parents.len();
    }

    pub fn parent_of(&self, created_at: &Ticket) -> Option<Ticket> {
        return self.parents.get(created_at).copied();
    }

    pub fn ancestry(&self, created_at: &Ticket) -> Option<Ancestry> {
        let mut path = Ancestry::new();
        let mut current = *created_at;
        while current != Ticket::INITIAL {
            path.push(current);
            current = *self.parents.get(&current)?;
        }
        path.reverse();
        return Some(path);
    }

    /// Resolve any registered element, tombstones included.
    /// Costs one hash lookup per level of nesting.
    pub fn find(&self, created_at: &Ticket) -> Option<&Element> {
        let mut element = &self.object;
        for ticket in self.ancestry(created_at)? {
            element = element.child(&ticket)?;
        }
        return Some(element);
    }

    pub(crate) fn find_mut(&mut self, created_at: &Ticket) -> Option<&mut Element> {
        let path = self.ancestry(created_at)?;
        let mut element = &mut self.object;
        for ticket in path {
            element = element.child_mut(&ticket)?;
        }
        return Some(element);
    }

    /// Like `find`, failing with `TargetNotFound`.
    pub fn resolve(&self, created_at: &Ticket) -> Result<&Element> {
        return self.find(created_at).ok_or(Error::TargetNotFound(*created_at));
    }

    /// Like `find_mut`, failing with `TargetNotFound`.
    pub(crate) fn resolve_mut(&mut self, created_at: &Ticket) -> Result<&mut Element> {
        return self.find_mut(created_at).ok_or(Error::TargetNotFound(*created_at));
    }

    /// Registration records for `element` and its descendants.
    pub(crate) fn entries(element: &Element, parent: Ticket) -> Vec<Entry> {
        let mut entries = Vec::new();
        element.collect_entries(parent, &mut entries);
        return entries;
    }

    /// Verify that `element` and its `entries` can be registered without
    /// touching the registry. A ticket may only come back for the same
    /// element under the same parent.
    pub(crate) fn check_entries(&self, element: &Element, entries: &[Entry]) -> Result<()> {
        if let Some(first) = entries.first() {
            if first.parent != Ticket::INITIAL && !self.parents.contains_key(&first.parent) {
                return Err(Error::TargetNotFound(first.parent));
            }
        }
        for entry in entries {
            let taken = match self.parents.get(&entry.created_at) {
                _ if entry.created_at == Ticket::INITIAL => true,
                Some(parent) if *parent != entry.parent => true,
                Some(_) if entry.created_at == element.created_at() => self
                    .find(&entry.created_at)
                    .is_some_and(|registered| !registered.same_as(element)),
                _ => false,
            };
            if taken {
                warn!(ticket = %entry.created_at, parent = %entry.parent, "ticket already registered for another element");
                return Err(Error::TicketCollision(entry.created_at));
            }
        }
        return Ok(());
    }

    pub(crate) fn register_entries(&mut self, entries: Vec<Entry>) {
        for entry in entries {
            self.parents.insert(entry.created_at, entry.parent);
            if entry.removed {
                self.register_removed_element(entry.created_at);
            }
            if entry.has_garbage {
                self.register_gc_container(entry.created_at);
            }
        }
    }

    /// Register an element and its descendants under `parent`.
    ///
    /// Registering the same element under the same parent again is a no-op.
    pub fn register_element(&mut self, element: &Element, parent: Ticket) -> Result<()> {
        let entries = Self::entries(element, parent);
        self.check_entries(element, &entries)?;
        self.register_entries(entries);
        return Ok(());
    }

    /// Track a tombstoned element for collection.
    pub fn register_removed_element(&mut self, created_at: Ticket) {
        if self.removed.insert(created_at) {
            debug!(ticket = %created_at, "registered tombstone");
        }
    }

    /// Track a text or tree holding removed nodes.
    pub fn register_gc_container(&mut self, created_at: Ticket) {
        self.gc_containers.insert(created_at);
    }

    /// Tombstoned elements whose removal is at or before `min_synced`, sorted.
    pub fn garbage_collectable(&self, min_synced: &Ticket) -> Vec<Ticket> {
        return self
            .removed
            .iter()
            .filter(|ticket| {
                self.find(ticket)
                    .and_then(Element::removed_at)
                    .is_some_and(|removed_at| removed_at <= *min_synced)
            })
            .copied()
            .collect();
    }

    /// Drop an element and its descendants from its container and the
    /// registry. Returns how many elements went.
    pub fn purge(&mut self, created_at: &Ticket) -> Result<usize> {
        let parent = self
            .parent_of(created_at)
            .ok_or(Error::TargetNotFound(*created_at))?;
        let element = match self.resolve_mut(&parent)? {
            Element::Array(array) => array.purge(created_at)?,
            Element::Object(object) => object.purge(created_at)?,
            other => return Err(Error::mismatch("container", other.kind())),
        };

        let entries = Self::entries(&element, parent);
        for entry in &entries {
            self.parents.remove(&entry.created_at);
            self.removed.remove(&entry.created_at);
            self.gc_containers.remove(&entry.created_at);
        }
        trace!(ticket = %created_at, count = entries.len(), "purged element");
        return Ok(entries.len());
    }

    /// Purge every collectable element, removed text or tree node and vacant
    /// array slot.
    /// Returns the number of elements and nodes collected.
    pub fn garbage_collect(&mut self, min_synced: &Ticket) -> usize {
        let mut count = 0;
        for ticket in self.garbage_collectable(min_synced) {
            // Already gone with a collected ancestor
            if !self.parents.contains_key(&ticket) {
                continue;
            }
            match self.purge(&ticket) {
                Ok(purged) => count += purged,
                Err(err) => warn!(ticket = %ticket, error = %err, "failed to purge element"),
            }
        }

        let containers: Vec<Ticket> = self.gc_containers.iter().copied().collect();
        for ticket in containers {
            let Some(element) = self.find_mut(&ticket) else {
                self.gc_containers.remove(&ticket);
                continue;
            };
            count += match element {
                Element::Array(array) => array.purge_vacant_slots_before(min_synced),
                Element::Text(text) => text.purge_removed_nodes_before(min_synced),
                Element::Tree(tree) => tree.purge_removed_nodes_before(min_synced),
                _ => 0,
            };
            if element.garbage_len() == 0 {
                self.gc_containers.remove(&ticket);
            }
        }

        debug!(count, min_synced = %min_synced, "garbage collected");
        return count;
    }

    /// Number of elements and nodes awaiting collection.
    pub fn garbage_len(&self) -> usize {
        let mut seen = FxHashSet::default();
        for ticket in &self.removed {
            if let Some(element) = self.find(ticket) {
                for entry in Self::entries(element, Ticket::INITIAL) {
                    seen.insert(entry.created_at);
                }
            }
        }
        let nodes: usize = self
            .gc_containers
            .iter()
            .filter_map(|ticket| self.find(ticket))
            .map(Element::garbage_len)
            .sum();
        return seen.len() + nodes;
    }

    /// JSON view of the live document.
    pub fn snapshot(&self) -> Json {
        return self.object.to_json();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::Value;
    use crate::crdt::primitives::ActorId;
    use serde_json::json;

    fn t(lamport: u64) -> Ticket {
        return Ticket::new(lamport, 0, ActorId::from_u64(1));
    }

    /// Root with {"list": [1, 2]}.
    fn sample() -> Root {
        let mut root = Root::new();
        let mut list = Element::array(t(1));
        {
            let array = list.as_array_mut().unwrap();
            array.push(Element::primitive(1, t(2)), &t(2)).unwrap();
            array.push(Element::primitive(2, t(3)), &t(3)).unwrap();
        }
        root.register_element(&list, Ticket::INITIAL).unwrap();
        root.object.as_object_mut().unwrap().set("list", list);
        return root;
    }

    #[test]
    fn registers_descendants() {
        let root = sample();
        assert_eq!(root.element_count(), 3);
        assert_eq!(root.parent_of(&t(3)), Some(t(1)));
        assert_eq!(root.ancestry(&t(3)).unwrap().as_slice(), &[t(1), t(3)]);
        assert!(matches!(
            root.find(&t(2)),
            Some(Element::Primitive(p)) if *p.value() == Value::Integer(1)
        ));
        assert!(root.find(&t(99)).is_none());
        assert_eq!(root.snapshot(), json!({"list": [1, 2]}));
    }

    #[test]
    fn registration_is_idempotent_per_parent() {
        let mut root = sample();
        let again = Element::primitive(1, t(2));
        assert!(root.register_element(&again, t(1)).is_ok());
        assert_eq!(root.element_count(), 3);

        assert_eq!(
            root.register_element(&again, Ticket::INITIAL),
            Err(Error::TicketCollision(t(2)))
        );
        assert_eq!(
            root.register_element(&Element::primitive("other", t(2)), t(1)),
            Err(Error::TicketCollision(t(2)))
        );
        assert_eq!(
            root.register_element(&Element::array(t(2)), t(1)),
            Err(Error::TicketCollision(t(2)))
        );
        assert_eq!(
            root.register_element(&Element::primitive(0, Ticket::INITIAL), t(1)),
            Err(Error::TicketCollision(Ticket::INITIAL))
        );
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut root = Root::new();
        assert_eq!(
            root.register_element(&Element::primitive(0, t(5)), t(4)),
            Err(Error::TargetNotFound(t(4)))
        );
    }

    #[test]
    fn collects_removed_elements_after_sync() {
        let mut root = sample();
        let array = root.resolve_mut(&t(1)).unwrap().as_array_mut().unwrap();
        let tombstones = array.delete_by_created_at(&t(2), &t(4)).unwrap();
        for ticket in tombstones {
            root.register_removed_element(ticket);
        }

        assert_eq!(root.garbage_len(), 1);
        assert!(root.garbage_collectable(&t(3)).is_empty());
        assert_eq!(root.garbage_collectable(&t(4)), vec![t(2)]);

        assert_eq!(root.garbage_collect(&t(4)), 1);
        assert_eq!(root.garbage_len(), 0);
        assert!(root.find(&t(2)).is_none());
        assert_eq!(root.element_count(), 2);
        assert_eq!(root.snapshot(), json!({"list": [2]}));
    }

    #[test]
    fn purging_a_container_deregisters_children() {
        let mut root = sample();
        root.object.as_object_mut().unwrap().delete("list", &t(5));
        root.register_removed_element(t(1));

        assert_eq!(root.garbage_len(), 3);
        assert_eq!(root.purge(&t(1)).unwrap(), 3);
        assert_eq!(root.element_count(), 0);
        assert_eq!(root.purge(&t(1)), Err(Error::TargetNotFound(t(1))));
    }
}
