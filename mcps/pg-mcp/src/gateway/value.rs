//! Row and scalar value types returned by a query gateway

use base64::Engine as _;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Int(i) => serializer.serialize_i64(*i),
            Scalar::Float(f) => serializer.serialize_f64(*f),
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::Bytes(b) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(b))
            }
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// One result row, columns kept in select-list order
///
/// Serializes as a JSON object. Duplicate column names are kept as-is;
/// the last one wins when a client parses the object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Scalar)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    /// Builder-style push, handy in tests
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        self.columns.push((name.into(), value.into()));
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_keeps_column_order() {
        let row = Row::new().with("zeta", 1i64).with("alpha", "a");
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":"a"}"#);
    }

    #[test]
    fn test_scalar_serialization() {
        let row = Row::new()
            .with("n", Scalar::Null)
            .with("b", true)
            .with("f", 1.5f64)
            .with("raw", Scalar::Bytes(vec![0xde, 0xad]));
        let value = serde_json::to_value(&row).unwrap();
        assert!(value["n"].is_null());
        assert_eq!(value["b"], true);
        assert_eq!(value["f"], 1.5);
        assert_eq!(value["raw"], "3q0=");
    }

    #[test]
    fn test_option_maps_to_null() {
        let missing: Option<i64> = None;
        assert_eq!(Scalar::from(missing), Scalar::Null);
        assert_eq!(Scalar::from(Some("x")), Scalar::Text("x".to_string()));
    }

    #[test]
    fn test_duplicate_columns_are_all_written() {
        let row = Row::new().with("id", 1i64).with("id", 2i64);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":1,"id":2}"#);
    }
}
