//! Map from string keys to elements, last writer wins.
//!
//! Every value ever set stays resolvable by its creation ticket until it is
//! purged. For each key the member with the newest creation ticket is the
//! visible one; every older member of that key is tombstoned with the
//! winner's ticket, whichever order the writes arrive in.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::Element;
use super::Meta;
use super::Tombstones;
use super::primitives::Ticket;
use crate::error::Error;
use crate::error::Result;

#[derive(Clone, Debug)]
struct Member {
    key: String,
    element: Element,
}

/// A replicated map.
#[derive(Clone, Debug)]
pub struct Object {
    pub(super) meta: Meta,
    members: FxHashMap<Ticket, Member>,
    /// Member tickets per key in ascending order; the last one wins.
    keys: BTreeMap<String, SmallVec<[Ticket; 1]>>,
}

impl Object {
    pub fn new(created_at: Ticket) -> Object {
        return Object {
            meta: Meta::new(created_at),
            members: FxHashMap::default(),
            keys: BTreeMap::new(),
        };
    }

    /// Set `key` to `value`. Returns the members tombstoned by the write,
    /// which is the incoming value itself when a newer one already holds the key.
    pub fn set(&mut self, key: &str, value: Element) -> Tombstones {
        let mut tombstones = Tombstones::new();
        let created_at = value.created_at();
        if self.members.contains_key(&created_at) {
            return tombstones;
        }

        self.members.insert(
            created_at,
            Member {
                key: key.to_owned(),
                element: value,
            },
        );
        let tickets = self.keys.entry(key.to_owned()).or_default();
        let at = tickets.partition_point(|t| *t < created_at);
        tickets.insert(at, created_at);

        let Some(&winner) = tickets.last() else {
            return tombstones;
        };
        let losers: SmallVec<[Ticket; 2]> = tickets.iter().filter(|t| **t != winner).copied().collect();
        for loser in losers {
            if let Some(member) = self.members.get_mut(&loser) {
                if member.element.remove(&winner) {
                    tombstones.push(loser);
                }
            }
        }
        return tombstones;
    }

    /// Tombstone the member created at `created_at`.
    /// Returns whether its marker changed.
    pub fn delete_by_created_at(&mut self, created_at: &Ticket, executed_at: &Ticket) -> Result<bool> {
        let member = self
            .members
            .get_mut(created_at)
            .ok_or(Error::TargetNotFound(*created_at))?;
        return Ok(member.element.remove(executed_at));
    }

    /// Tombstone the visible member of `key`, returning its ticket.
    pub fn delete(&mut self, key: &str, executed_at: &Ticket) -> Option<Ticket> {
        let winner = self.winner(key)?;
        let member = self.members.get_mut(&winner)?;
        if member.element.is_removed() {
            return None;
        }
        member.element.remove(executed_at);
        return Some(winner);
    }

    fn winner(&self, key: &str) -> Option<Ticket> {
        return self.keys.get(key)?.last().copied();
    }

    /// The live value of `key`.
    pub fn get(&self, key: &str) -> Option<&Element> {
        let element = &self.members.get(&self.winner(key)?)?.element;
        if element.is_removed() {
            return None;
        }
        return Some(element);
    }

    pub fn has(&self, key: &str) -> bool {
        return self.get(key).is_some();
    }

    /// Live keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        return self.iter().map(|(key, _)| key);
    }

    /// Live members in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Element)> {
        return self.keys.iter().filter_map(|(key, tickets)| {
            let element = &self.members.get(tickets.last()?)?.element;
            if element.is_removed() {
                return None;
            }
            Some((key.as_str(), element))
        });
    }

    /// Every member, tombstones included, in no particular order.
    pub fn iter_all(&self) -> impl Iterator<Item = &Element> {
        return self.members.values().map(|member| &member.element);
    }

    pub fn len(&self) -> usize {
        return self.iter().count();
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    pub fn find_by_created_at(&self, created_at: &Ticket) -> Option<&Element> {
        return self.members.get(created_at).map(|member| &member.element);
    }

    pub fn find_by_created_at_mut(&mut self, created_at: &Ticket) -> Option<&mut Element> {
        return self.members.get_mut(created_at).map(|member| &mut member.element);
    }

    /// Physically drop a member.
    pub fn purge(&mut self, created_at: &Ticket) -> Result<Element> {
        let member = self
            .members
            .remove(created_at)
            .ok_or(Error::TargetNotFound(*created_at))?;
        if let Some(tickets) = self.keys.get_mut(&member.key) {
            tickets.retain(|t| t != created_at);
            if tickets.is_empty() {
                self.keys.remove(&member.key);
            }
        }
        return Ok(member.element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::primitives::ActorId;
    use serde_json::json;

    fn t(lamport: u64, actor: u64) -> Ticket {
        return Ticket::new(lamport, 0, ActorId::from_u64(actor));
    }

    fn snapshot(object: &Object) -> serde_json::Value {
        let map = object.iter().map(|(k, v)| (k.to_owned(), v.to_json())).collect();
        return serde_json::Value::Object(map);
    }

    #[test]
    fn set_get_delete() {
        let mut object = Object::new(t(1, 1));
        object.set("a", Element::primitive(1, t(2, 1)));
        object.set("b", Element::primitive("x", t(3, 1)));
        assert_eq!(snapshot(&object), json!({"a": 1, "b": "x"}));
        assert!(object.has("a"));

        assert_eq!(object.delete("a", &t(4, 1)), Some(t(2, 1)));
        assert!(!object.has("a"));
        assert_eq!(object.delete("a", &t(5, 1)), None);
        assert_eq!(object.keys().collect::<Vec<_>>(), vec!["b"]);

        // The tombstone is still resolvable
        assert!(object.find_by_created_at(&t(2, 1)).unwrap().is_removed());
    }

    #[test]
    fn overwrite_tombstones_previous() {
        let mut object = Object::new(t(1, 1));
        object.set("a", Element::primitive(1, t(2, 1)));
        let tombstones = object.set("a", Element::primitive(2, t(3, 1)));
        assert_eq!(tombstones.as_slice(), &[t(2, 1)]);
        assert_eq!(snapshot(&object), json!({"a": 2}));
    }

    #[test]
    fn concurrent_sets_converge() {
        let base = {
            let mut object = Object::new(t(1, 1));
            object.set("k", Element::primitive(0, t(2, 1)));
            object
        };
        let x = Element::primitive(6, t(6, 2));
        let y = Element::primitive(7, t(7, 1));

        let mut left = base.clone();
        left.set("k", x.clone());
        left.set("k", y.clone());

        let mut right = base.clone();
        let late = right.set("k", y);
        assert_eq!(late.as_slice(), &[t(2, 1)]);
        let loser = right.set("k", x);
        assert_eq!(loser.as_slice(), &[t(6, 2)]);

        assert_eq!(snapshot(&left), json!({"k": 7}));
        assert_eq!(snapshot(&left), snapshot(&right));
        for ticket in [t(2, 1), t(6, 2)] {
            assert_eq!(
                left.find_by_created_at(&ticket).unwrap().removed_at(),
                right.find_by_created_at(&ticket).unwrap().removed_at(),
            );
        }
    }

    #[test]
    fn replayed_set_is_noop() {
        let mut object = Object::new(t(1, 1));
        object.set("a", Element::primitive(1, t(2, 1)));
        assert!(object.set("a", Element::primitive(1, t(2, 1))).is_empty());
        assert_eq!(object.iter_all().count(), 1);
    }

    #[test]
    fn purge_forgets_key() {
        let mut object = Object::new(t(1, 1));
        object.set("a", Element::primitive(1, t(2, 1)));
        object.delete("a", &t(3, 1));
        object.purge(&t(2, 1)).unwrap();
        assert_eq!(object.iter_all().count(), 0);
        assert!(object.purge(&t(2, 1)).is_err());
        assert!(object.is_empty());
    }

    #[test]
    fn delete_unknown_member_fails() {
        let mut object = Object::new(t(1, 1));
        assert_eq!(
            object.delete_by_created_at(&t(9, 1), &t(10, 1)),
            Err(Error::TargetNotFound(t(9, 1)))
        );
    }
}
