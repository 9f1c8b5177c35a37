//! Identifier types for replicas and causal timestamps.
//!
//! # Identifier Hierarchy
//!
//! - `ActorId`: identifies a replica (12 bytes derived from its public key)
//! - `Ticket`: identifies one mutation or one element (lamport, actor, delimiter)
//!
//! Tickets are:
//! - Globally unique: an actor never stamps the same (lamport, delimiter) twice
//! - Totally ordered: lamport first, then actor, then delimiter
//! - Compact: 24 bytes, `Copy`
//! - Hashable: used as map keys throughout the registry and containers

use std::cmp::Ordering;
use std::fmt;

use crate::key::hex;

/// Number of bytes in an actor id.
pub const ACTOR_ID_LEN: usize = 12;

/// A replica identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub [u8; ACTOR_ID_LEN]);

impl ActorId {
    /// The actor used before a replica has an identity, and by sentinels.
    pub const INITIAL: ActorId = ActorId([0x00; ACTOR_ID_LEN]);

    /// The largest possible actor id.
    pub const MAX: ActorId = ActorId([0xff; ACTOR_ID_LEN]);

    /// Derive an actor id from a public key: the leading bytes of its blake3 hash.
    pub fn from_public_key(key: &[u8; 32]) -> ActorId {
        let digest = blake3::hash(key);
        let mut bytes = [0u8; ACTOR_ID_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[..ACTOR_ID_LEN]);
        return ActorId(bytes);
    }

    /// Build an actor id from a small integer. Handy for simulations.
    pub fn from_u64(n: u64) -> ActorId {
        let mut bytes = [0u8; ACTOR_ID_LEN];
        bytes[ACTOR_ID_LEN - 8..].copy_from_slice(&n.to_be_bytes());
        return ActorId(bytes);
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "ActorId({})", hex(&self.0));
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}", hex(&self.0));
    }
}

/// A causal timestamp and identity.
///
/// Every operation is stamped with the ticket it was executed at, and every
/// element with the ticket it was created at. Tickets never change once
/// issued; `with_actor` and `with_delimiter` derive new ones.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    lamport: u64,
    actor: ActorId,
    delimiter: u32,
}

impl Ticket {
    /// The smallest ticket. Stamps sentinels such as the root object.
    pub const INITIAL: Ticket = Ticket {
        lamport: 0,
        actor: ActorId::INITIAL,
        delimiter: 0,
    };

    /// The largest ticket.
    pub const MAX: Ticket = Ticket {
        lamport: u64::MAX,
        actor: ActorId::MAX,
        delimiter: u32::MAX,
    };

    /// Create a new ticket.
    pub fn new(lamport: u64, delimiter: u32, actor: ActorId) -> Ticket {
        return Ticket { lamport, actor, delimiter };
    }

    #[inline]
    pub fn lamport(&self) -> u64 {
        return self.lamport;
    }

    #[inline]
    pub fn actor(&self) -> ActorId {
        return self.actor;
    }

    #[inline]
    pub fn delimiter(&self) -> u32 {
        return self.delimiter;
    }

    /// Whether this ticket sorts strictly after `other`.
    #[inline]
    pub fn after(&self, other: &Ticket) -> bool {
        return self > other;
    }

    /// The same ticket attributed to another actor.
    pub fn with_actor(&self, actor: ActorId) -> Ticket {
        return Ticket { actor, ..*self };
    }

    /// A sibling ticket sharing lamport and actor.
    pub fn with_delimiter(&self, delimiter: u32) -> Ticket {
        return Ticket { delimiter, ..*self };
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare by lamport, then actor, then delimiter
        match self.lamport.cmp(&other.lamport) {
            Ordering::Equal => match self.actor.cmp(&other.actor) {
                Ordering::Equal => self.delimiter.cmp(&other.delimiter),
                other => other,
            },
            other => other,
        }
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "Ticket({})", self);
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}:{}:{}", self.lamport, self.actor, self.delimiter);
    }
}
