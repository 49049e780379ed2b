//! Extracted submission records

use serde::{Deserialize, Serialize};

/// A typed column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map(FieldValue::Float).unwrap_or(FieldValue::Null)
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(value: Option<i64>) -> Self {
        value.map(FieldValue::Integer).unwrap_or(FieldValue::Null)
    }
}

/// One submission flattened into destination columns
///
/// Columns keep schema order. The natural key is held apart from the other
/// columns so a record can never be built without one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    key_column: String,
    instance_id: String,
    columns: Vec<(String, FieldValue)>,
}

impl ExtractedRecord {
    pub fn new(key_column: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            instance_id: instance_id.into(),
            columns: Vec::new(),
        }
    }

    /// Set a column, replacing any earlier value for the same name
    pub fn set(&mut self, column: impl Into<String>, value: FieldValue) {
        let column = column.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: FieldValue) -> Self {
        self.set(column, value);
        self
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// All non-key columns, nulls included
    pub fn columns(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Non-key columns carrying a value
    pub fn present_columns(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns().filter(|(_, value)| !value.is_null())
    }
}
