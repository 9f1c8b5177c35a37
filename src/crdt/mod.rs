//! Replicated document elements.
//!
//! A document is a tree of elements owned by value: containers (`Array`,
//! `Object`) hold their children, `Text` and `Tree` hold their own nodes.
//! Every element is identified by the ticket it was created at and carries
//! its lifecycle markers in a `Meta`.

pub mod array;
pub mod object;
pub mod op;
pub mod primitive;
pub mod primitives;
pub mod root;
pub mod text;
pub mod tree;

use std::fmt;

use serde_json::Value as Json;
use smallvec::SmallVec;

pub use array::Array;
pub use object::Object;
pub use primitive::Primitive;
pub use primitive::Value;
pub use text::Text;
pub use tree::Tree;

use crate::error::Error;
use crate::error::Result;
use primitives::Ticket;
use primitives::Weighted;
use root::Entry;

/// Tickets of elements tombstoned by one container call.
pub type Tombstones = SmallVec<[Ticket; 2]>;

/// The variant of an element, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Primitive,
    Array,
    Text,
    Tree,
    Object,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        return match self {
            ElementKind::Primitive => "primitive",
            ElementKind::Array => "array",
            ElementKind::Text => "text",
            ElementKind::Tree => "tree",
            ElementKind::Object => "object",
        };
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(self.name());
    }
}

/// Lifecycle markers shared by every element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Meta {
    created_at: Ticket,
    moved_at: Option<Ticket>,
    removed_at: Option<Ticket>,
}

impl Meta {
    pub fn new(created_at: Ticket) -> Meta {
        return Meta {
            created_at,
            moved_at: None,
            removed_at: None,
        };
    }

    /// Tombstone at `executed_at` if that is later than both the creation
    /// and any earlier removal. Returns whether the marker changed.
    pub fn remove(&mut self, executed_at: &Ticket) -> bool {
        if !executed_at.after(&self.created_at) {
            return false;
        }
        match self.removed_at {
            Some(removed_at) if !executed_at.after(&removed_at) => false,
            _ => {
                self.removed_at = Some(*executed_at);
                true
            }
        }
    }
}

/// A document element.
#[derive(Clone, Debug)]
pub enum Element {
    Primitive(Primitive),
    Array(Array),
    Text(Text),
    Tree(Tree),
    Object(Object),
}

impl Element {
    pub fn primitive(value: impl Into<Value>, created_at: Ticket) -> Element {
        return Element::Primitive(Primitive::new(value.into(), created_at));
    }

    pub fn array(created_at: Ticket) -> Element {
        return Element::Array(Array::new(created_at));
    }

    pub fn text(created_at: Ticket) -> Element {
        return Element::Text(Text::new(created_at));
    }

    /// A tree whose root node has type `root_type` and shares `created_at`.
    pub fn tree(created_at: Ticket, root_type: &str) -> Element {
        return Element::Tree(Tree::new(created_at, root_type));
    }

    pub fn object(created_at: Ticket) -> Element {
        return Element::Object(Object::new(created_at));
    }

    pub fn kind(&self) -> ElementKind {
        return match self {
            Element::Primitive(_) => ElementKind::Primitive,
            Element::Array(_) => ElementKind::Array,
            Element::Text(_) => ElementKind::Text,
            Element::Tree(_) => ElementKind::Tree,
            Element::Object(_) => ElementKind::Object,
        };
    }

    fn meta(&self) -> &Meta {
        return match self {
            Element::Primitive(e) => &e.meta,
            Element::Array(e) => &e.meta,
            Element::Text(e) => &e.meta,
            Element::Tree(e) => &e.meta,
            Element::Object(e) => &e.meta,
        };
    }

    fn meta_mut(&mut self) -> &mut Meta {
        return match self {
            Element::Primitive(e) => &mut e.meta,
            Element::Array(e) => &mut e.meta,
            Element::Text(e) => &mut e.meta,
            Element::Tree(e) => &mut e.meta,
            Element::Object(e) => &mut e.meta,
        };
    }

    #[inline]
    pub fn created_at(&self) -> Ticket {
        return self.meta().created_at;
    }

    #[inline]
    pub fn moved_at(&self) -> Option<Ticket> {
        return self.meta().moved_at;
    }

    #[inline]
    pub fn removed_at(&self) -> Option<Ticket> {
        return self.meta().removed_at;
    }

    /// Where this element sits in a sequence: its last move, else its creation.
    #[inline]
    pub fn positioned_at(&self) -> Ticket {
        let meta = self.meta();
        return meta.moved_at.unwrap_or(meta.created_at);
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        return self.meta().removed_at.is_some();
    }

    /// Tombstone this element. See `Meta::remove`.
    pub fn remove(&mut self, executed_at: &Ticket) -> bool {
        return self.meta_mut().remove(executed_at);
    }

    pub fn set_moved_at(&mut self, moved_at: Ticket) {
        self.meta_mut().moved_at = Some(moved_at);
    }

    /// Whether `other` can be a second delivery of this element: same
    /// ticket, same variant and, for primitives, the same value.
    pub fn same_as(&self, other: &Element) -> bool {
        if self.created_at() != other.created_at() || self.kind() != other.kind() {
            return false;
        }
        return match (self, other) {
            (Element::Primitive(a), Element::Primitive(b)) => a.value() == b.value(),
            _ => true,
        };
    }

    /// An independent copy preserving every ticket and marker.
    pub fn deep_copy(&self) -> Element {
        return self.clone();
    }

    pub fn as_array(&self) -> Result<&Array> {
        match self {
            Element::Array(array) => Ok(array),
            other => Err(Error::mismatch("array", other.kind())),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Array> {
        match self {
            Element::Array(array) => Ok(array),
            other => Err(Error::mismatch("array", other.kind())),
        }
    }

    pub fn as_text(&self) -> Result<&Text> {
        match self {
            Element::Text(text) => Ok(text),
            other => Err(Error::mismatch("text", other.kind())),
        }
    }

    pub fn as_text_mut(&mut self) -> Result<&mut Text> {
        match self {
            Element::Text(text) => Ok(text),
            other => Err(Error::mismatch("text", other.kind())),
        }
    }

    pub fn as_tree(&self) -> Result<&Tree> {
        match self {
            Element::Tree(tree) => Ok(tree),
            other => Err(Error::mismatch("tree", other.kind())),
        }
    }

    pub fn as_tree_mut(&mut self) -> Result<&mut Tree> {
        match self {
            Element::Tree(tree) => Ok(tree),
            other => Err(Error::mismatch("tree", other.kind())),
        }
    }

    pub fn as_object(&self) -> Result<&Object> {
        match self {
            Element::Object(object) => Ok(object),
            other => Err(Error::mismatch("object", other.kind())),
        }
    }

    pub fn as_object_mut(&mut self) -> Result<&mut Object> {
        match self {
            Element::Object(object) => Ok(object),
            other => Err(Error::mismatch("object", other.kind())),
        }
    }

    /// Direct child by creation ticket, tombstoned children included.
    pub fn child(&self, created_at: &Ticket) -> Option<&Element> {
        return match self {
            Element::Array(array) => array.find_by_created_at(created_at),
            Element::Object(object) => object.find_by_created_at(created_at),
            _ => None,
        };
    }

    pub fn child_mut(&mut self, created_at: &Ticket) -> Option<&mut Element> {
        return match self {
            Element::Array(array) => array.find_by_created_at_mut(created_at),
            Element::Object(object) => object.find_by_created_at_mut(created_at),
            _ => None,
        };
    }

    /// Removed nodes held inside a text or tree, or vacant array slots.
    pub fn garbage_len(&self) -> usize {
        return match self {
            Element::Array(array) => array.garbage_len(),
            Element::Text(text) => text.garbage_len(),
            Element::Tree(tree) => tree.garbage_len(),
            _ => 0,
        };
    }

    /// Append a registry entry for this element and each of its descendants.
    pub(crate) fn collect_entries(&self, parent: Ticket, out: &mut Vec<Entry>) {
        let created_at = self.created_at();
        out.push(Entry {
            created_at,
            parent,
            removed: self.is_removed(),
            has_garbage: self.garbage_len() > 0,
        });
        match self {
            Element::Array(array) => {
                for child in array.iter_all() {
                    child.collect_entries(created_at, out);
                }
            }
            Element::Object(object) => {
                for child in object.iter_all() {
                    child.collect_entries(created_at, out);
                }
            }
            _ => {}
        }
    }

    /// Plain JSON view of the live content.
    pub fn to_json(&self) -> Json {
        return match self {
            Element::Primitive(p) => p.value().to_json(),
            Element::Array(array) => Json::Array(array.iter().map(Element::to_json).collect()),
            Element::Text(text) => Json::String(text.to_string()),
            Element::Tree(tree) => tree.to_json(),
            Element::Object(object) => {
                let map = object
                    .iter()
                    .map(|(key, element)| (key.to_owned(), element.to_json()))
                    .collect();
                Json::Object(map)
            }
        };
    }
}

impl Weighted for Element {
    fn weight(&self) -> u64 {
        if self.is_removed() {
            return 0;
        }
        return 1;
    }
}
