// File: src/validation/mod.rs
// Purpose: Collect submitted values per schema field and run the generic checks

use crate::field::{Field, FieldType, SubmittedField};
use crate::request::FormData;
use crate::value::FieldValue;

pub mod validators;

use validators::{char_len, is_valid_email, is_valid_url, matches_pattern, parse_number};

/// Values and errors of one submission, one entry per schema field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub fields: Vec<SubmittedField>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.fields.iter().any(SubmittedField::has_errors)
    }

    /// Get first error for a field, by key or name
    pub fn get_error(&self, key_or_name: &str) -> Option<&String> {
        self.get_errors(key_or_name)?.first()
    }

    /// Get all errors for a field, by key or name
    pub fn get_errors(&self, key_or_name: &str) -> Option<&Vec<String>> {
        self.fields
            .iter()
            .find(|field| field.key == key_or_name || field.name == key_or_name)
            .map(|field| &field.errors)
    }
}

/// Raw values of a field, looked up by key, then by name
fn raw_values<'a>(field: &Field, data: &'a FormData) -> Option<&'a [String]> {
    data.get_all(&field.key).or_else(|| data.get_all(&field.name))
}

fn is_checked(value: &str) -> bool {
    matches!(value, "1" | "true" | "on" | "yes")
}

/// Turn posted strings into a typed value for the field
pub fn coerce(field: &Field, raw: Option<&[String]>) -> FieldValue {
    let first = raw.and_then(|values| values.first());

    match &field.field_type {
        FieldType::Checkbox => FieldValue::List(
            raw.unwrap_or_default()
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| FieldValue::Text(v.clone()))
                .collect(),
        ),
        FieldType::TrueFalse => FieldValue::Bool(first.map_or(false, |v| is_checked(v))),
        FieldType::Number => match first {
            Some(v) => parse_number(v)
                .map(FieldValue::Number)
                .unwrap_or_else(|| FieldValue::Text(v.clone())),
            None => FieldValue::Null,
        },
        _ => first.map_or(FieldValue::Null, |v| FieldValue::Text(v.clone())),
    }
}

/// Collect one submitted field per schema field, skipping excluded ones
pub fn collect(fields: &[Field], data: &FormData, exclude: &[String]) -> Vec<SubmittedField> {
    fields
        .iter()
        .filter(|field| !exclude.iter().any(|excluded| field.matches(excluded)))
        .map(|field| {
            SubmittedField::new(
                field.key.clone(),
                field.name.clone(),
                field.display_label(),
                coerce(field, raw_values(field, data)),
            )
        })
        .collect()
}

/// Run the generic checks of a field against its submitted value
///
/// An empty required field gets only the required error; an empty optional
/// field gets none.
pub fn validate_field(field: &Field, submitted: &mut SubmittedField) {
    let empty = submitted.value.is_empty() || submitted.value == FieldValue::Bool(false);
    if empty {
        if field.required {
            submitted.add_error(format!("{} value is required", field.display_label()));
        }
        return;
    }

    let rules = &field.rules;
    let text = submitted.value.to_display_string();

    match &field.field_type {
        FieldType::Email if !is_valid_email(&text) => {
            submitted.add_error("Invalid email address");
        }
        FieldType::Url if !is_valid_url(&text) => {
            submitted.add_error("Invalid URL");
        }
        FieldType::Number => match submitted.value {
            FieldValue::Number(n) => {
                if let Some(min) = rules.min.filter(|min| n < *min) {
                    submitted.add_error(format!(
                        "Value must be equal to or higher than {}",
                        FieldValue::Number(min).to_display_string()
                    ));
                }
                if let Some(max) = rules.max.filter(|max| n > *max) {
                    submitted.add_error(format!(
                        "Value must be equal to or lower than {}",
                        FieldValue::Number(max).to_display_string()
                    ));
                }
            }
            _ => submitted.add_error("Value must be a number"),
        },
        _ => {}
    }

    if !field.field_type.is_multi_valued() && field.field_type != FieldType::Number {
        if let Some(min) = rules.min_length.filter(|min| char_len(&text) < *min) {
            submitted.add_error(format!("Value must be at least {} characters", min));
        }
        if let Some(max) = rules.max_length.filter(|max| char_len(&text) > *max) {
            submitted.add_error(format!("Value must be at most {} characters", max));
        }
        if let Some(pattern) = &rules.pattern {
            if !matches_pattern(&text, pattern) {
                submitted.add_error("Value does not match the required format");
            }
        }
    }

    if field.field_type.has_choices() && !rules.choices.is_empty() {
        let all_known = submitted
            .value
            .as_list()
            .iter()
            .all(|value| rules.choices.contains(value));
        if !all_known {
            submitted.add_error("Invalid selection");
        }
    }
}

/// Collect and check a submission against a field schema
pub fn validate(fields: &[Field], data: &FormData, exclude: &[String]) -> ValidationResult {
    let mut submitted = collect(fields, data, exclude);
    for entry in submitted.iter_mut() {
        if let Some(field) = fields.iter().find(|field| field.key == entry.key) {
            validate_field(field, entry);
        }
    }
    ValidationResult { fields: submitted }
}
