//! Schema-less record type for remote entities.
//!
//! Vault query results are rows of named fields whose set varies per
//! entity and per query, so records stay as JSON objects with defensive
//! accessors instead of per-entity structs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One remote entity row: a mapping of field names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; returns `None` for anything that is not an
    /// object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Raw field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Trimmed string content of a field; null, absent, and non-string
    /// values all read as empty.
    #[must_use]
    pub fn text(&self, field: &str) -> String {
        match self.0.get(field) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// Set a field value.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// Remove a field, ignoring absence.
    pub fn remove(&mut self, field: &str) {
        self.0.remove(field);
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Underlying field map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Convert raw query results into records, dropping non-object rows.
#[must_use]
pub fn records_from_values(values: Vec<Value>) -> Vec<Record> {
    values
        .into_iter()
        .filter_map(|value| {
            let record = Record::from_value(value);
            if record.is_none() {
                tracing::warn!("dropping non-object row from query result");
            }
            record
        })
        .collect()
}
