// File: src/form.rs
// Purpose: The resolved form record

use crate::notify::EmailNotification;
use crate::restriction::Restriction;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Texts shown around the form
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormDisplay {
    #[serde(default)]
    pub description: String,

    /// Shown in place of the form after a successful submission
    #[serde(default)]
    pub success_message: String,
}

/// A complete, defaulted form
///
/// Produced only by [`crate::resolver::FormResolver`]; `key` is never empty.
/// Keys added to the defaults template by filters land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// Content-store id; `None` for code-registered forms
    #[serde(default)]
    pub id: Option<i64>,

    pub key: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub display: FormDisplay,

    #[serde(default)]
    pub create_entries: bool,

    #[serde(default)]
    pub restrictions: Vec<Restriction>,

    #[serde(default)]
    pub emails: Vec<EmailNotification>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Whether an identifier has the shape of a form key
///
/// Keys are ASCII alphanumeric/underscore tokens that are not purely numeric;
/// purely numeric identifiers address store-backed forms by id.
pub fn is_valid_form_key(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !identifier.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("form_contact", true)]
    #[case("contact", true)]
    #[case("form_2024", true)]
    #[case("42", false)]
    #[case("", false)]
    #[case("form-contact", false)]
    #[case("form contact", false)]
    fn test_is_valid_form_key(#[case] identifier: &str, #[case] expected: bool) {
        assert_eq!(is_valid_form_key(identifier), expected);
    }
}
