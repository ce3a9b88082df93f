//! Typed metadata field values.
//!
//! Caller metadata enters the system as a serde JSON image; SQL wants typed
//! parameters. [`FieldType`] is what a schema declares, [`FieldValue`] is a
//! checked scalar that can cross the SQL boundary.
//!
//! Type mapping at the database: `Text` ↔ `TEXT`, `Integer` ↔ `BIGINT`,
//! `Float` ↔ `DOUBLE PRECISION`, `Boolean` ↔ `BOOLEAN`,
//! `Timestamp` ↔ `TIMESTAMPTZ`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::ValidationIssue;

/// Declared type of a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl FieldType {
    /// Lowercase name used in validation messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        }
    }
}

/// A checked scalar value for one metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// The declared type this value satisfies.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::Text(_) => FieldType::Text,
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::Boolean(_) => FieldType::Boolean,
            Self::Timestamp(_) => FieldType::Timestamp,
        }
    }

    /// Check a JSON value against a declared type.
    ///
    /// Integers must be whole (a JSON `1.5` is not an `Integer`), floats must
    /// be finite, timestamps must parse as RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationIssue`] at `path` describing the mismatch.
    pub fn from_json(ty: FieldType, value: &Value, path: &str) -> Result<Self, ValidationIssue> {
        let mismatch = |message: &str| {
            ValidationIssue::new(path, message, ty.name(), json_type_name(value))
        };
        match ty {
            FieldType::Text => match value {
                Value::String(s) => Ok(Self::Text(s.clone())),
                _ => Err(mismatch("not a string")),
            },
            FieldType::Integer => value
                .as_i64()
                .map(Self::Integer)
                .ok_or_else(|| mismatch("not a whole number")),
            FieldType::Float => match value.as_f64() {
                Some(f) if f.is_finite() => Ok(Self::Float(f)),
                Some(_) => Err(mismatch("not a finite number")),
                None => Err(mismatch("not a number")),
            },
            FieldType::Boolean => match value {
                Value::Bool(b) => Ok(Self::Boolean(*b)),
                _ => Err(mismatch("not a boolean")),
            },
            FieldType::Timestamp => match value {
                Value::String(s) => DateTime::parse_from_rfc3339(s)
                    .map(|dt| Self::Timestamp(dt.with_timezone(&Utc)))
                    .map_err(|_| mismatch("not an RFC 3339 timestamp")),
                _ => Err(mismatch("not an RFC 3339 timestamp")),
            },
        }
    }

    /// The JSON image of this value (timestamps as RFC 3339 strings).
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(Value::Null, Value::Number),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Timestamp(dt) => {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Timestamp(dt) => {
                f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// JSON type name for validation messages.
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn text_accepts_strings_only() {
        let ok = FieldValue::from_json(FieldType::Text, &json!("src/x.ts"), "path").unwrap();
        assert_eq!(ok, FieldValue::Text("src/x.ts".to_string()));

        let err = FieldValue::from_json(FieldType::Text, &json!(42), "path").unwrap_err();
        assert_eq!(err.expected, "text");
        assert_eq!(err.received, "number");
    }

    #[rstest]
    #[case(json!(7), Some(7))]
    #[case(json!(-3), Some(-3))]
    #[case(json!(1.5), None)]
    #[case(json!("7"), None)]
    fn integer_requires_whole_numbers(#[case] input: Value, #[case] expected: Option<i64>) {
        let result = FieldValue::from_json(FieldType::Integer, &input, "n");
        match expected {
            Some(i) => assert_eq!(result.unwrap(), FieldValue::Integer(i)),
            None => assert!(result.is_err()),
        }
    }

    #[test]
    fn float_accepts_integers_but_not_nan() {
        let ok = FieldValue::from_json(FieldType::Float, &json!(2), "score").unwrap();
        assert_eq!(ok, FieldValue::Float(2.0));

        // serde_json cannot even represent NaN, but a missing number still fails
        assert!(FieldValue::from_json(FieldType::Float, &json!("x"), "score").is_err());
    }

    #[test]
    fn timestamp_round_trips_rfc3339() {
        let input = json!("2026-02-09T14:30:00Z");
        let value = FieldValue::from_json(FieldType::Timestamp, &input, "ts").unwrap();
        assert_eq!(value.to_json(), json!("2026-02-09T14:30:00Z"));

        assert!(FieldValue::from_json(FieldType::Timestamp, &json!("yesterday"), "ts").is_err());
    }

    #[test]
    fn display_renders_document_keys() {
        assert_eq!(FieldValue::Text("src/a.rs".to_string()).to_string(), "src/a.rs");
        assert_eq!(FieldValue::Integer(12).to_string(), "12");
    }
}
