// File: src/field.rs
// Purpose: Field schema types and submitted field values

use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of input a field renders as and validates against
///
/// Unknown type names are kept as `Other` so schemas written for newer field
/// types still load; they only get the generic required check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Url,
    Number,
    Password,
    Select,
    Radio,
    Checkbox,
    TrueFalse,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Number => "number",
            FieldType::Password => "password",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::TrueFalse => "true_false",
            FieldType::Other(name) => name,
        }
    }

    /// Whether a submission may carry several values for this field
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, FieldType::Checkbox)
    }

    /// Whether the field validates against `rules.choices`
    pub fn has_choices(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio | FieldType::Checkbox)
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "text" => FieldType::Text,
            "textarea" => FieldType::Textarea,
            "email" => FieldType::Email,
            "url" => FieldType::Url,
            "number" => FieldType::Number,
            "password" => FieldType::Password,
            "select" => FieldType::Select,
            "radio" => FieldType::Radio,
            "checkbox" => FieldType::Checkbox,
            "true_false" => FieldType::TrueFalse,
            _ => FieldType::Other(name),
        }
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::Text
    }
}

/// Type-specific validation rules
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Regex the whole value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

/// A field definition supplied by the schema provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,

    pub name: String,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub instructions: String,

    #[serde(default)]
    pub rules: FieldRules,
}

impl Field {
    pub fn new(key: impl Into<String>, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            field_type,
            label: String::new(),
            required: false,
            instructions: String::new(),
            rules: FieldRules::default(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn rules(mut self, rules: FieldRules) -> Self {
        self.rules = rules;
        self
    }

    /// Label for messages, falling back to the field name
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }

    pub fn matches(&self, key_or_name: &str) -> bool {
        self.key == key_or_name || self.name == key_or_name
    }
}

/// A field group as the schema provider stores it
///
/// `forms` lists the form keys the group is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub key: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub forms: Vec<String>,
}

/// One schema field's value and errors for a single submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedField {
    pub key: String,
    pub name: String,
    pub label: String,
    pub value: FieldValue,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SubmittedField {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        label: impl Into<String>,
        value: FieldValue,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            label: label.into(),
            value,
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Extract a submitted value by field key or field name
///
/// Returns `None` when no submitted field matches.
pub fn extract_field_value<'a>(
    key_or_name: &str,
    fields: &'a [SubmittedField],
) -> Option<&'a FieldValue> {
    fields
        .iter()
        .find(|field| field.key == key_or_name || field.name == key_or_name)
        .map(|field| &field.value)
}
