//! Row domain type

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the record identifier column when none is configured
pub const DEFAULT_IDENTIFIER_FIELD: &str = "RID";

/// Opaque key-value record from the store
///
/// The poller only ever reads the identifier column; every other field is
/// left for the job handler to interpret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    /// Creates an empty row
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds a row holding only the given identifier
    pub fn with_identifier(field: &str, id: Value) -> Self {
        let mut row = Self::new();
        row.insert(field, id);
        row
    }

    /// Returns the raw value of a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns a field rendered as text
    ///
    /// Strings are returned verbatim, numbers and booleans are formatted,
    /// `null`, arrays and objects yield `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Sets a field, replacing any previous value
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Returns the row identifier, if the row carries one
    pub fn identifier<'a>(&'a self, field: &str) -> Option<&'a Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    /// Borrows a printable form of the identifier for log lines
    pub fn display_id<'a>(&'a self, field: &'a str) -> DisplayId<'a> {
        DisplayId { row: self, field }
    }

    /// Copies every field of `other` into this row
    pub fn merge(&mut self, other: &Row) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Row {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// Log-friendly view of a row identifier
pub struct DisplayId<'a> {
    row: &'a Row,
    field: &'a str,
}

impl fmt::Display for DisplayId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row.identifier(self.field) {
            Some(Value::String(s)) => f.write_str(s),
            Some(other) => write!(f, "{}", other),
            None => f.write_str("<no id>"),
        }
    }
}
