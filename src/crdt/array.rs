//! Ordered container addressed by index and by creation ticket.
//!
//! The sequence is made of slots. Every operation that places an element
//! (insert, replace or move) creates a slot stamped with its own ticket, and
//! operations name their predecessor by slot ticket. Slots live in a splay
//! tree where a slot holding a live element weighs 1 and every other slot
//! weighs 0, so index lookups skip tombstones in O(log n) amortized. An empty
//! head slot stamped `Ticket::INITIAL` anchors insertion at the front.
//!
//! Concurrent slots after the same predecessor are ordered by the RGA rule:
//! a newer slot lands closer to its predecessor.
//!
//! Moving an element creates a slot at the destination and leaves the old
//! slot vacant, so anything anchored on the old slot lands in the same place
//! whether it arrives before or after the move. The latest move owns the
//! element; an older move arriving late only adds a vacant slot.
//!
//! Replacing an element (`set_by_index`) inserts the new value after the slot
//! the author saw the target in and tombstones the target. The latest
//! operation that targeted an element owns it: any replacement value written
//! by an earlier operation is tombstoned with the ticket of the later one.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::Element;
use super::Meta;
use super::Tombstones;
use super::primitives::NodeId;
use super::primitives::SplayTree;
use super::primitives::Ticket;
use super::primitives::Weighted;
use crate::error::Error;
use crate::error::Result;

/// A place in the sequence, stamped by the operation that created it.
#[derive(Clone, Debug)]
struct Slot {
    created_at: Ticket,
    /// None once the element moved away, and for the head.
    element: Option<Element>,
}

impl Weighted for Slot {
    fn weight(&self) -> u64 {
        return match &self.element {
            Some(element) => element.weight(),
            None => 0,
        };
    }
}

/// A value written over a target element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Replacement {
    value: Ticket,
    executed_at: Ticket,
}

fn out_of_bounds(index: usize) -> Error {
    return Error::structural(format!("index {} out of bounds", index));
}

/// A replicated sequence of elements.
#[derive(Clone, Debug)]
pub struct Array {
    pub(super) meta: Meta,
    slots: SplayTree<Slot>,
    /// Slot ticket to node, vacant slots and the head included.
    positions: FxHashMap<Ticket, NodeId>,
    /// Element ticket to the node of the slot holding it.
    nodes: FxHashMap<Ticket, NodeId>,
    /// Vacant slots as `(vacated_at, slot)`, oldest first.
    vacant: BTreeSet<(Ticket, Ticket)>,
    /// Target ticket to the values written over it.
    replacements: FxHashMap<Ticket, SmallVec<[Replacement; 1]>>,
}

impl Array {
    pub fn new(created_at: Ticket) -> Array {
        let mut slots = SplayTree::new();
        let head = slots.push(Slot {
            created_at: Ticket::INITIAL,
            element: None,
        });
        let mut positions = FxHashMap::default();
        positions.insert(Ticket::INITIAL, head);

        return Array {
            meta: Meta::new(created_at),
            slots,
            positions,
            nodes: FxHashMap::default(),
            vacant: BTreeSet::new(),
            replacements: FxHashMap::default(),
        };
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        return self.slots.total_weight() as usize;
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Resolve a slot ticket; `Ticket::INITIAL` names the head.
    fn position(&self, slot: &Ticket) -> Result<NodeId> {
        return self
            .positions
            .get(slot)
            .copied()
            .ok_or(Error::TargetNotFound(*slot));
    }

    /// Node of the slot holding the element created at `created_at`.
    fn node(&self, created_at: &Ticket) -> Result<NodeId> {
        return self
            .nodes
            .get(created_at)
            .copied()
            .ok_or(Error::TargetNotFound(*created_at));
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        return self.slots.get(id)?.element.as_ref();
    }

    /// Walk past successors created after `executed_at`.
    fn find_next_before_executed_at(&self, mut node: NodeId, executed_at: &Ticket) -> NodeId {
        while let Some(next) = self.slots.next(node) {
            match self.slots.get(next) {
                Some(slot) if slot.created_at.after(executed_at) => node = next,
                _ => break,
            }
        }
        return node;
    }

    fn insert_slot(&mut self, prev: NodeId, element: Option<Element>, executed_at: &Ticket) -> NodeId {
        let prev = self.find_next_before_executed_at(prev, executed_at);
        let created_at = element.as_ref().map(Element::created_at);
        let id = self.slots.insert_after(
            Some(prev),
            Slot {
                created_at: *executed_at,
                element,
            },
        );
        self.positions.insert(*executed_at, id);
        if let Some(created_at) = created_at {
            self.nodes.insert(created_at, id);
        }
        return id;
    }

    /// Whether an operation executed at `executed_at` already placed `value`.
    fn holds(&self, value: &Element, executed_at: &Ticket) -> bool {
        return self.positions.contains_key(executed_at) || self.nodes.contains_key(&value.created_at());
    }

    /// Insert `value` in a new slot after the slot created at `prev`.
    ///
    /// A value that is already present is left untouched.
    pub fn insert_after(&mut self, prev: &Ticket, value: Element, executed_at: &Ticket) -> Result<()> {
        let prev = self.position(prev)?;
        if self.holds(&value, executed_at) {
            return Ok(());
        }
        self.insert_slot(prev, Some(value), executed_at);
        return Ok(());
    }

    /// Append after the last slot.
    pub fn push(&mut self, value: Element, executed_at: &Ticket) -> Result<()> {
        let last = self.last_created_at();
        return self.insert_after(&last, value, executed_at);
    }

    /// Tombstone the element held at `id` with `executed_at`.
    fn update_removed(&mut self, id: NodeId, executed_at: &Ticket) -> bool {
        return self
            .slots
            .update(id, |slot| match &mut slot.element {
                Some(element) => element.remove(executed_at),
                None => false,
            })
            .unwrap_or(false);
    }

    /// Tombstone every replacement of `target` written before the target's
    /// final removal.
    fn settle_replacements(&mut self, target: &Ticket, tombstones: &mut Tombstones) {
        let Some(removed_at) = self.find_by_created_at(target).and_then(Element::removed_at) else {
            return;
        };
        let Some(replacements) = self.replacements.get(target) else {
            return;
        };
        let stale: SmallVec<[Ticket; 2]> = replacements
            .iter()
            .filter(|r| r.executed_at < removed_at)
            .map(|r| r.value)
            .collect();
        for value in stale {
            if let Some(&id) = self.nodes.get(&value) {
                if self.update_removed(id, &removed_at) {
                    tombstones.push(value);
                }
            }
        }
    }

    /// Replace the element created at `target` with `value`, placed after
    /// `slot`, the slot the author saw the target in.
    ///
    /// Returns the tickets tombstoned by this call, the replaced element first.
    pub fn set_by_index(
        &mut self,
        target: &Ticket,
        slot: &Ticket,
        value: Element,
        executed_at: &Ticket,
    ) -> Result<Tombstones> {
        let target_id = self.node(target)?;
        let anchor = self.position(slot)?;

        let mut tombstones = Tombstones::new();
        if self.holds(&value, executed_at) {
            return Ok(tombstones);
        }

        let value_created_at = value.created_at();
        self.insert_slot(anchor, Some(value), executed_at);
        if self.update_removed(target_id, executed_at) {
            tombstones.push(*target);
        }
        self.replacements.entry(*target).or_default().push(Replacement {
            value: value_created_at,
            executed_at: *executed_at,
        });
        self.settle_replacements(target, &mut tombstones);
        return Ok(tombstones);
    }

    /// Tombstone the element created at `target`.
    pub fn delete_by_created_at(&mut self, target: &Ticket, executed_at: &Ticket) -> Result<Tombstones> {
        let id = self.node(target)?;

        let mut tombstones = Tombstones::new();
        if self.update_removed(id, executed_at) {
            tombstones.push(*target);
        }
        self.settle_replacements(target, &mut tombstones);
        return Ok(tombstones);
    }

    /// Tombstone the live element at `index`.
    pub fn delete_by_index(&mut self, index: usize, executed_at: &Ticket) -> Result<Tombstones> {
        let target = self.created_at_by_index(index)?;
        return self.delete_by_created_at(&target, executed_at);
    }

    /// Move the element created at `created_at` into a new slot after the
    /// slot created at `prev`.
    ///
    /// The latest move wins. An older move arriving late still creates its
    /// slot, vacant, so operations anchored on it resolve everywhere.
    pub fn move_after(&mut self, prev: &Ticket, created_at: &Ticket, executed_at: &Ticket) -> Result<()> {
        let prev = self.position(prev)?;
        let current = self.node(created_at)?;
        if self.positions.contains_key(executed_at) {
            return Ok(());
        }

        let superseded_at = match self.element(current).and_then(Element::moved_at) {
            Some(moved_at) if !executed_at.after(&moved_at) => Some(moved_at),
            _ => None,
        };
        if let Some(moved_at) = superseded_at {
            self.insert_slot(prev, None, executed_at);
            self.vacant.insert((moved_at, *executed_at));
            return Ok(());
        }

        let Some((vacated, Some(mut value))) = self
            .slots
            .update(current, |slot| (slot.created_at, slot.element.take()))
        else {
            return Err(Error::TargetNotFound(*created_at));
        };
        self.vacant.insert((*executed_at, vacated));
        value.set_moved_at(*executed_at);
        self.insert_slot(prev, Some(value), executed_at);
        return Ok(());
    }

    /// The live element at `index`.
    pub fn get(&mut self, index: usize) -> Option<&Element> {
        let (id, _) = self.slots.find(index as u64)?;
        return self.element(id);
    }

    pub fn created_at_by_index(&mut self, index: usize) -> Result<Ticket> {
        return self
            .get(index)
            .map(Element::created_at)
            .ok_or_else(|| out_of_bounds(index));
    }

    /// Ticket of the slot holding the live element at `index`.
    pub fn positioned_at_by_index(&mut self, index: usize) -> Result<Ticket> {
        let (id, _) = self.slots.find(index as u64).ok_or_else(|| out_of_bounds(index))?;
        return self
            .slots
            .get(id)
            .map(|slot| slot.created_at)
            .ok_or_else(|| out_of_bounds(index));
    }

    /// Ticket of the last slot, vacant ones and tombstones included;
    /// `Ticket::INITIAL` when the array never held anything.
    pub fn last_created_at(&self) -> Ticket {
        return self
            .slots
            .last()
            .and_then(|id| self.slots.get(id))
            .map(|slot| slot.created_at)
            .unwrap_or(Ticket::INITIAL);
    }

    /// Index of a live element.
    pub fn index_of(&mut self, created_at: &Ticket) -> Option<usize> {
        let id = *self.nodes.get(created_at)?;
        if self.element(id)?.is_removed() {
            return None;
        }
        return self.slots.index_of(id).map(|index| index as usize);
    }

    pub fn find_by_created_at(&self, created_at: &Ticket) -> Option<&Element> {
        return self.element(*self.nodes.get(created_at)?);
    }

    pub fn find_by_created_at_mut(&mut self, created_at: &Ticket) -> Option<&mut Element> {
        let id = *self.nodes.get(created_at)?;
        return self.slots.get_mut(id)?.element.as_mut();
    }

    /// Physically drop a tombstoned element together with its slot.
    pub fn purge(&mut self, created_at: &Ticket) -> Result<Element> {
        let id = self
            .nodes
            .remove(created_at)
            .ok_or(Error::TargetNotFound(*created_at))?;
        self.replacements.remove(created_at);
        let slot = self.slots.delete(id).ok_or(Error::TargetNotFound(*created_at))?;
        self.positions.remove(&slot.created_at);
        return slot.element.ok_or(Error::TargetNotFound(*created_at));
    }

    /// Vacant slots left behind by moves.
    pub fn garbage_len(&self) -> usize {
        return self.vacant.len();
    }

    /// Drop vacant slots vacated at or before `min_synced`.
    pub fn purge_vacant_slots_before(&mut self, min_synced: &Ticket) -> usize {
        let mut count = 0;
        while let Some(&(vacated_at, slot)) = self.vacant.first() {
            if vacated_at.after(min_synced) {
                break;
            }
            self.vacant.pop_first();
            if let Some(id) = self.positions.remove(&slot) {
                self.slots.delete(id);
                count += 1;
            }
        }
        return count;
    }

    /// Live elements in order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        return self.iter_all().filter(|element| !element.is_removed());
    }

    /// Every element in order, tombstones included.
    pub fn iter_all(&self) -> impl Iterator<Item = &Element> {
        return self.slots.values().filter_map(|slot| slot.element.as_ref());
    }

    pub fn check_weights(&self) -> bool {
        return self.slots.check_weights();
    }
}
