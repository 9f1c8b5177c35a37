//! Lamport clock issuing tickets.
//!
//! The clock is a plain value owned by whoever issues tickets (usually a
//! `Document`), never a process-wide counter, so independent documents in one
//! process do not interfere. Local changes stamp the next lamport; remote
//! tickets are observed so that every ticket issued afterwards sorts after
//! everything this replica has seen.

use super::id::ActorId;
use super::id::Ticket;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LamportClock {
    lamport: u64,
}

impl LamportClock {
    pub fn new() -> LamportClock {
        return LamportClock { lamport: 0 };
    }

    /// Lamport of the last ticket issued or observed.
    #[inline]
    pub fn lamport(&self) -> u64 {
        return self.lamport;
    }

    /// Stamp a fresh ticket for `actor`.
    pub fn next(&mut self, actor: ActorId) -> Ticket {
        self.lamport += 1;
        return Ticket::new(self.lamport, 0, actor);
    }

    /// Account for a ticket produced elsewhere. Never moves backwards.
    #[inline]
    pub fn observe(&mut self, ticket: &Ticket) {
        self.lamport = self.lamport.max(ticket.lamport());
    }
}
