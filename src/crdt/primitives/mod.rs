//! Shared primitives for the replicated containers.
//!
//! # Primitives
//!
//! ## Identity
//! - `ActorId`: replica identifier (derived from a public key)
//! - `Ticket`: causal timestamp and element identity
//!
//! ## Clocks
//! - `LamportClock`: monotonic counter issuing tickets
//!
//! ## Trees
//! - `SplayTree`: self-adjusting tree indexed by cumulative weight

pub mod clock;
pub mod id;
pub mod splay;

// Re-exports for convenience
pub use clock::LamportClock;
pub use id::ActorId;
pub use id::Ticket;
pub use splay::NodeId;
pub use splay::SplayTree;
pub use splay::Weighted;
