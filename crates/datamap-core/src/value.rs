//! Storage values.
//!
//! [`Value`] is the single currency for data crossing the adapter boundary:
//! raw rows coming out of a backend, typed in-memory field values, filter
//! parameters and primary keys. Scalar variants can be persisted directly;
//! `Date`, `DateTime` and `Json` are typed in-memory forms that field types
//! render to scalars on the way to storage.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// A dynamically typed storage value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Calendar date (in-memory typed form).
    Date(NaiveDate),
    /// Date and time without timezone (in-memory typed form).
    DateTime(NaiveDateTime),
    /// Structured data (in-memory typed form of the `serialized` field type).
    Json(serde_json::Value),
}

impl Value {
    /// Whether a backend can persist this variant directly.
    ///
    /// `Date`, `DateTime` and `Json` are in-memory typed forms; field types
    /// render them to scalars during dehydration.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Text(_)
                | Value::Bytes(_)
        )
    }

    /// Whether this is `Value::Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The text payload, if this is `Text`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The date payload, if this is a `Date`.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The datetime payload, if this is a `DateTime`.
    #[must_use]
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// The JSON payload, if this is `Json`.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(d) => write!(f, "'{d}'"),
            Value::DateTime(dt) => write!(f, "'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Identity keys
// ============================================================================

/// A primary-key value usable as an identity-map key.
///
/// Wraps one or more scalar [`Value`]s (compound keys keep their declaration
/// order) and implements `Eq`/`Hash` over them; floats hash and compare by
/// their bit pattern so that a key is equal to itself.
#[derive(Debug, Clone)]
pub struct Key {
    parts: Vec<Value>,
}

impl Key {
    /// Build a key from a single scalar value.
    ///
    /// Fails with a data-shape error for non-scalar or null values.
    pub fn new(value: Value) -> Result<Self> {
        Self::composite(vec![value])
    }

    /// Build a compound key from scalar parts in declaration order.
    pub fn composite(parts: Vec<Value>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::InvalidKey("empty key".to_string()));
        }
        for part in &parts {
            if part.is_null() || !part.is_scalar() {
                return Err(Error::InvalidKey(part.to_string()));
            }
        }
        Ok(Key { parts })
    }

    /// The key parts in declaration order.
    #[must_use]
    pub fn parts(&self) -> &[Value] {
        &self.parts
    }
}

fn hash_part<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Int(i) => {
            2u8.hash(state);
            i.hash(state);
        }
        Value::Float(x) => {
            3u8.hash(state);
            x.to_bits().hash(state);
        }
        Value::Text(s) => {
            4u8.hash(state);
            s.hash(state);
        }
        Value::Bytes(b) => {
            5u8.hash(state);
            b.hash(state);
        }
        // Non-scalar variants are rejected at construction.
        Value::Date(_) | Value::DateTime(_) | Value::Json(_) => 6u8.hash(state),
    }
}

fn parts_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.parts.len() == other.parts.len()
            && self
                .parts
                .iter()
                .zip(other.parts.iter())
                .all(|(a, b)| parts_equal(a, b))
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.len().hash(state);
        for part in &self.parts {
            hash_part(part, state);
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.parts.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(","))
    }
}
