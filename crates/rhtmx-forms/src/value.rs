// File: src/value.rs
// Purpose: Submitted and stored field values

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A field value as collected from a submission or read back from a store
///
/// `Extra` keeps anything the typed variants cannot represent (objects coming
/// from custom field types) so it survives a store round trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
    Extra(JsonValue),
}

impl FieldValue {
    /// Convert value to string for display and template interpolation
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(true) => "Yes".to_string(),
            FieldValue::Bool(false) => "No".to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items
                .iter()
                .map(|v| v.to_display_string())
                .collect::<Vec<_>>()
                .join(", "),
            FieldValue::Extra(json) => json.to_string(),
        }
    }

    /// Whether the value counts as "not filled in" for required checks
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Bool(_) | FieldValue::Number(_) => false,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|v| v.is_empty()),
            FieldValue::Extra(json) => json.is_null(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten into the raw strings a form input would post
    pub fn as_list(&self) -> Vec<String> {
        match self {
            FieldValue::Null => Vec::new(),
            FieldValue::List(items) => items.iter().map(|v| v.to_display_string()).collect(),
            other => vec![other.to_display_string()],
        }
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    pub fn from_json(json: JsonValue) -> Self {
        serde_json::from_value(json.clone()).unwrap_or(FieldValue::Extra(json))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        FieldValue::List(items)
    }
}
