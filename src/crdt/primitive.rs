//! Scalar values.

use serde_json::Value as Json;

use super::Meta;
use super::primitives::Ticket;
use crate::key::hex;

/// The payload of a primitive element.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Date(i64),
}

impl Value {
    pub fn to_json(&self) -> Json {
        return match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(n) => Json::from(*n),
            Value::Long(n) => Json::from(*n),
            // NaN and infinities have no JSON form
            Value::Double(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Bytes(bytes) => Json::String(hex(bytes)),
            Value::Date(ms) => Json::from(*ms),
        };
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        return Value::Boolean(b);
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        return Value::Integer(n);
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        return Value::Long(n);
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        return Value::Double(n);
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        return Value::String(s.to_owned());
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        return Value::String(s);
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        return Value::Bytes(bytes);
    }
}

/// An immutable scalar element.
#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub(super) meta: Meta,
    value: Value,
}

impl Primitive {
    pub fn new(value: Value, created_at: Ticket) -> Primitive {
        return Primitive {
            meta: Meta::new(created_at),
            value,
        };
    }

    pub fn value(&self) -> &Value {
        return &self.value;
    }
}
