//! Error types for operation execution.

use thiserror::Error;

use crate::crdt::ElementKind;
use crate::crdt::primitives::Ticket;

/// Failures surfaced while applying an operation.
///
/// All of them are deterministic consequences of the input: the same
/// operation against the same state fails the same way on every replica.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The target resolved to an element of the wrong variant.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: ElementKind,
    },

    /// No element or node is registered under this ticket.
    #[error("target not found: {0}")]
    TargetNotFound(Ticket),

    /// The operation would break the shape of a container.
    #[error("structural violation: {0}")]
    StructuralViolation(String),

    /// A ticket is already registered for a different element or parent.
    #[error("ticket collision: {0}")]
    TicketCollision(Ticket),
}

/// Result type for operation execution.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn structural(msg: impl Into<String>) -> Self {
        return Self::StructuralViolation(msg.into());
    }

    pub(crate) fn mismatch(expected: &'static str, found: ElementKind) -> Self {
        return Self::TypeMismatch { expected, found };
    }
}
