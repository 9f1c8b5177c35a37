//! Tandem - the replication core of a collaborative document engine.
//!
//! Replicas edit a shared tree of elements independently and converge by
//! applying the same operations in any causally consistent order.
//!
//! # Quick Start
//!
//! ```
//! use tandem::crdt::Element;
//! use tandem::crdt::primitives::Ticket;
//! use tandem::document::Document;
//! use tandem::key::Identity;
//!
//! // Two replicas with their own identities
//! let mut alice = Document::new(Identity::generate().actor());
//! let mut bob = Document::new(Identity::generate().actor());
//!
//! // Alice creates a text and types into it
//! let create = alice.object_set(Ticket::INITIAL, "title", Element::text).unwrap();
//! let text = create.executed_at();
//! let typed = alice.text_edit(text, 0, 0, "Hello").unwrap();
//!
//! // Bob receives the operations
//! bob.apply(&create).unwrap();
//! bob.apply(&typed).unwrap();
//! assert_eq!(alice.snapshot(), bob.snapshot());
//! assert_eq!(bob.to_json(), r#"{"title":"Hello"}"#);
//! ```

pub mod crdt;
pub mod document;
pub mod error;
pub mod key;

pub use document::Document;
pub use document::DocumentOptions;
pub use error::Error;
pub use error::Result;
