//! Field types and value coercion.
//!
//! Every declared entity field carries a [`FieldType`] describing how raw
//! storage values become typed in-memory values (hydration) and back
//! (dehydration). Built-in types cover booleans, integers, floats, dates and
//! serialized blobs; anything else is a [`FieldType::Custom`] backed by a
//! [`FieldCodec`] registered in a [`FieldTypeRegistry`].

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The declared type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    /// Plain text, stored as-is.
    #[default]
    Text,
    /// Boolean; hydrates integer and text representations.
    Boolean,
    /// Signed integer; hydrates numeric text.
    Integer,
    /// 64-bit float; hydrates integers and numeric text.
    Float,
    /// Calendar date, stored as `YYYY-MM-DD` text.
    Date,
    /// Date and time, stored as `YYYY-MM-DD HH:MM:SS` text.
    DateTime,
    /// Structured data, stored as JSON text.
    Serialized,
    /// A custom type registered under this name in the [`FieldTypeRegistry`].
    Custom(&'static str),
}

impl FieldType {
    /// Convert a raw storage value into its typed in-memory form.
    pub fn hydrate(self, field: &str, value: Value, registry: &FieldTypeRegistry) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self {
            FieldType::Text => Ok(value),
            FieldType::Boolean => match value {
                Value::Bool(_) => Ok(value),
                Value::Int(i) => Ok(Value::Bool(i != 0)),
                Value::Text(ref s) => Ok(Value::Bool(!(s.is_empty() || s == "0"))),
                other => Err(coercion(field, "boolean", &other)),
            },
            FieldType::Integer => match value {
                Value::Int(_) => Ok(value),
                Value::Text(ref s) => s
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| coercion(field, "integer", &value)),
                other => Err(coercion(field, "integer", &other)),
            },
            FieldType::Float => match value {
                Value::Float(_) => Ok(value),
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Text(ref s) => s
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| coercion(field, "float", &value)),
                other => Err(coercion(field, "float", &other)),
            },
            FieldType::Date => match value {
                Value::Date(_) => Ok(value),
                Value::DateTime(dt) => Ok(Value::Date(dt.date())),
                Value::Text(ref s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|_| coercion(field, "date", &value)),
                other => Err(coercion(field, "date", &other)),
            },
            FieldType::DateTime => match value {
                Value::DateTime(_) => Ok(value),
                Value::Text(ref s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                    .map(Value::DateTime)
                    .map_err(|_| coercion(field, "datetime", &value)),
                other => Err(coercion(field, "datetime", &other)),
            },
            FieldType::Serialized => match value {
                Value::Json(_) => Ok(value),
                Value::Text(ref s) => serde_json::from_str(s)
                    .map(Value::Json)
                    .map_err(|_| coercion(field, "serialized", &value)),
                other => Err(coercion(field, "serialized", &other)),
            },
            FieldType::Custom(name) => registry.get(name)?.from_storage(value),
        }
    }

    /// Convert a typed in-memory value into its scalar storage form.
    ///
    /// Custom codec output is checked: a non-scalar result is a fatal
    /// data-shape error.
    pub fn dehydrate(
        self,
        field: &str,
        value: Value,
        registry: &FieldTypeRegistry,
    ) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self {
            FieldType::Text | FieldType::Boolean | FieldType::Integer | FieldType::Float => {
                Ok(value)
            }
            FieldType::Date => match value {
                Value::Date(d) => Ok(Value::Text(d.format(DATE_FORMAT).to_string())),
                Value::Text(_) => Ok(value),
                other => Err(coercion(field, "date", &other)),
            },
            FieldType::DateTime => match value {
                Value::DateTime(dt) => Ok(Value::Text(dt.format(DATETIME_FORMAT).to_string())),
                Value::Text(_) => Ok(value),
                other => Err(coercion(field, "datetime", &other)),
            },
            FieldType::Serialized => match value {
                Value::Json(ref j) => Ok(Value::Text(j.to_string())),
                Value::Text(_) => Ok(value),
                other => Err(coercion(field, "serialized", &other)),
            },
            FieldType::Custom(name) => {
                let stored = registry.get(name)?.to_storage(value)?;
                if stored.is_scalar() {
                    Ok(stored)
                } else {
                    Err(Error::NonScalarStorageValue(field.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Float => write!(f, "float"),
            FieldType::Date => write!(f, "date"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::Serialized => write!(f, "serialized"),
            FieldType::Custom(name) => write!(f, "custom({name})"),
        }
    }
}

fn coercion(field: &str, expected: &'static str, value: &Value) -> Error {
    Error::FieldCoercion {
        field: field.to_string(),
        expected,
        value: value.to_string(),
    }
}

/// Conversion hooks for a custom field type.
///
/// `to_storage` must produce a scalar value; the mapper treats a non-scalar
/// result as a fatal data-shape error.
pub trait FieldCodec {
    /// Raw storage value to typed in-memory value.
    fn from_storage(&self, value: Value) -> Result<Value>;

    /// Typed in-memory value to scalar storage value.
    fn to_storage(&self, value: Value) -> Result<Value>;
}

impl<F, T> FieldCodec for (F, T)
where
    F: Fn(Value) -> Result<Value>,
    T: Fn(Value) -> Result<Value>,
{
    fn from_storage(&self, value: Value) -> Result<Value> {
        (self.0)(value)
    }

    fn to_storage(&self, value: Value) -> Result<Value> {
        (self.1)(value)
    }
}

/// Registry of custom field types, keyed by name.
///
/// Registering the same name twice is a configuration error, raised
/// immediately rather than shadowing the earlier codec.
#[derive(Default)]
pub struct FieldTypeRegistry {
    codecs: HashMap<&'static str, Box<dyn FieldCodec>>,
}

impl FieldTypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec under `name`.
    pub fn register(&mut self, name: &'static str, codec: Box<dyn FieldCodec>) -> Result<()> {
        if self.codecs.contains_key(name) {
            return Err(Error::DuplicateFieldType(name.to_string()));
        }
        self.codecs.insert(name, codec);
        Ok(())
    }

    /// Look up a codec by name.
    pub fn get(&self, name: &str) -> Result<&dyn FieldCodec> {
        self.codecs
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| Error::UnknownFieldType(name.to_string()))
    }

    /// Whether a codec is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }
}

impl fmt::Debug for FieldTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldTypeRegistry")
            .field("registered", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A declared entity field: name plus [`FieldType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name (also the storage column name).
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
}

impl FieldDef {
    /// Declare a field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FieldTypeRegistry {
        FieldTypeRegistry::new()
    }

    #[test]
    fn test_boolean_hydration() {
        let r = registry();
        let ft = FieldType::Boolean;
        assert_eq!(
            ft.hydrate("f", Value::Int(1), &r).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            ft.hydrate("f", Value::Int(0), &r).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            ft.hydrate("f", Value::Text("0".to_string()), &r).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            ft.hydrate("f", Value::Text("yes".to_string()), &r).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_integer_hydration_rejects_garbage() {
        let r = registry();
        let ft = FieldType::Integer;
        assert_eq!(
            ft.hydrate("f", Value::Text("17".to_string()), &r).unwrap(),
            Value::Int(17)
        );
        assert!(ft.hydrate("f", Value::Text("x".to_string()), &r).is_err());
    }

    #[test]
    fn test_date_round_trip() {
        let r = registry();
        let hydrated = FieldType::Date
            .hydrate("born", Value::Text("2024-03-05".to_string()), &r)
            .unwrap();
        assert_eq!(
            hydrated,
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
        );
        let stored = FieldType::Date.dehydrate("born", hydrated, &r).unwrap();
        assert_eq!(stored, Value::Text("2024-03-05".to_string()));
    }

    #[test]
    fn test_datetime_round_trip() {
        let r = registry();
        let raw = Value::Text("2024-03-05 13:45:00".to_string());
        let hydrated = FieldType::DateTime.hydrate("at", raw.clone(), &r).unwrap();
        assert!(matches!(hydrated, Value::DateTime(_)));
        let stored = FieldType::DateTime.dehydrate("at", hydrated, &r).unwrap();
        assert_eq!(stored, raw);
    }

    #[test]
    fn test_serialized_round_trip() {
        let r = registry();
        let raw = Value::Text(r#"{"a":1}"#.to_string());
        let hydrated = FieldType::Serialized
            .hydrate("blob", raw.clone(), &r)
            .unwrap();
        assert_eq!(hydrated, Value::Json(serde_json::json!({"a": 1})));
        let stored = FieldType::Serialized.dehydrate("blob", hydrated, &r).unwrap();
        assert_eq!(stored, raw);
    }

    #[test]
    fn test_null_passes_through() {
        let r = registry();
        assert_eq!(
            FieldType::Integer.hydrate("f", Value::Null, &r).unwrap(),
            Value::Null
        );
        assert_eq!(
            FieldType::Date.dehydrate("f", Value::Null, &r).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_custom_codec_and_scalar_check() {
        let mut r = registry();
        r.register(
            "upper",
            Box::new((
                |v: Value| -> Result<Value> {
                    match v {
                        Value::Text(s) => Ok(Value::Text(s.to_uppercase())),
                        other => Ok(other),
                    }
                },
                |v: Value| -> Result<Value> { Ok(v) },
            )),
        )
        .unwrap();

        let hydrated = FieldType::Custom("upper")
            .hydrate("code", Value::Text("abc".to_string()), &r)
            .unwrap();
        assert_eq!(hydrated, Value::Text("ABC".to_string()));

        // A codec leaking a non-scalar into storage is a hard error.
        r.register(
            "bad",
            Box::new((
                |v: Value| -> Result<Value> { Ok(v) },
                |_: Value| -> Result<Value> { Ok(Value::Json(serde_json::json!([1, 2]))) },
            )),
        )
        .unwrap();
        let err = FieldType::Custom("bad")
            .dehydrate("code", Value::Int(1), &r)
            .unwrap_err();
        assert!(matches!(err, Error::NonScalarStorageValue(_)));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut r = registry();
        let codec = || -> Box<dyn FieldCodec> {
            Box::new((
                |v: Value| -> Result<Value> { Ok(v) },
                |v: Value| -> Result<Value> { Ok(v) },
            ))
        };
        r.register("money", codec()).unwrap();
        let err = r.register("money", codec()).unwrap_err();
        assert!(matches!(err, Error::DuplicateFieldType(_)));
    }
}
