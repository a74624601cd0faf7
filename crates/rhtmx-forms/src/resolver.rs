// File: src/resolver.rs
// Purpose: Turn raw definitions and form posts into complete Form records

use crate::error::{FormError, Result};
use crate::form::Form;
use crate::hooks::Hooks;
use crate::store::{ContentStore, Post, FORM_POST_TYPE};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;

/// Metadata key holding a store-backed form's key
pub const FORM_KEY_META: &str = "form_key";

/// Field names a form post stores its settings under
pub mod fields {
    pub const DESCRIPTION: &str = "form_description";
    pub const SUCCESS_MESSAGE: &str = "form_success_message";
    pub const CREATE_ENTRIES: &str = "form_create_entries";
    pub const RESTRICTIONS: &str = "form_restrictions";
    pub const EMAILS: &str = "form_emails";
}

/// Fills defaults into definitions and maps form posts
#[derive(Debug, Clone, Default)]
pub struct FormResolver {
    hooks: Arc<Hooks>,
}

impl FormResolver {
    pub fn new(hooks: Arc<Hooks>) -> Self {
        Self { hooks }
    }

    /// The default template after every defaults filter ran
    pub fn default_template(&self) -> Map<String, JsonValue> {
        let mut template = match json!({
            "id": null,
            "title": "",
            "key": "",
            "display": {
                "description": "",
                "success_message": "",
            },
            "create_entries": false,
            "restrictions": [],
            "emails": [],
        }) {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        self.hooks.filter_defaults(&mut template);
        template
    }

    /// Merge a raw definition over the defaults
    ///
    /// Rejects definitions whose `key` is missing, empty or not a string.
    pub fn resolve_definition(&self, definition: JsonValue) -> Result<Form> {
        let has_key = definition
            .get("key")
            .and_then(JsonValue::as_str)
            .map_or(false, |key| !key.is_empty());
        if !has_key {
            return Err(FormError::DefinitionInvalid);
        }

        let mut merged = JsonValue::Object(self.default_template());
        merge(&mut merged, definition);

        serde_json::from_value(merged).map_err(|e| {
            tracing::debug!("Form definition does not fit the form record: {}", e);
            FormError::DefinitionInvalid
        })
    }

    /// Re-run defaulting over an already resolved form
    pub fn normalize(&self, form: &Form) -> Result<Form> {
        let value = serde_json::to_value(form).map_err(|e| FormError::Store(e.into()))?;
        self.resolve_definition(value)
    }

    /// Map a form post into a form, then run the form filters
    ///
    /// Returns `None` for posts of another type and for posts whose key is
    /// missing or blanked by a filter.
    pub async fn from_post(&self, post: &Post, store: &dyn ContentStore) -> Result<Option<Form>> {
        if post.post_type != FORM_POST_TYPE {
            return Ok(None);
        }

        let key = store.get_meta(post.id, FORM_KEY_META).await?.unwrap_or_default();

        let mut definition = Map::new();
        definition.insert("id".to_string(), JsonValue::from(post.id));
        definition.insert("key".to_string(), JsonValue::String(key));
        definition.insert("title".to_string(), JsonValue::String(post.title.clone()));

        let mut display = Map::new();
        if let Some(description) = store.get_field_value(fields::DESCRIPTION, post.id).await? {
            display.insert("description".to_string(), as_text(description));
        }
        if let Some(message) = store.get_field_value(fields::SUCCESS_MESSAGE, post.id).await? {
            display.insert("success_message".to_string(), as_text(message));
        }
        definition.insert("display".to_string(), JsonValue::Object(display));

        if let Some(create) = store.get_field_value(fields::CREATE_ENTRIES, post.id).await? {
            definition.insert("create_entries".to_string(), JsonValue::Bool(is_truthy(&create)));
        }
        if let Some(restrictions) = store.get_field_value(fields::RESTRICTIONS, post.id).await? {
            definition.insert("restrictions".to_string(), as_list(restrictions));
        }
        if let Some(emails) = store.get_field_value(fields::EMAILS, post.id).await? {
            definition.insert("emails".to_string(), as_list(emails));
        }

        let form = match self.resolve_definition(JsonValue::Object(definition)) {
            Ok(form) => form,
            Err(FormError::DefinitionInvalid) => {
                tracing::debug!("Form post {} has no usable key", post.id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let form = self.hooks.filter_form(form, post);
        if form.key.is_empty() {
            tracing::debug!("Form filters blanked the key of form post {}", post.id);
            return Ok(None);
        }
        Ok(Some(form))
    }
}

/// Deep-merge `overlay` into `base`; null overlay values keep the base value
fn merge(base: &mut JsonValue, overlay: JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base), JsonValue::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, JsonValue::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

fn as_text(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(_) => value,
        JsonValue::Null => JsonValue::String(String::new()),
        other => JsonValue::String(other.to_string()),
    }
}

fn as_list(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(_) => value,
        _ => JsonValue::Array(Vec::new()),
    }
}

/// Checkbox-style truthiness of a stored setting
fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        JsonValue::String(s) => !matches!(s.trim(), "" | "0" | "false" | "no" | "off"),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
        JsonValue::Null => false,
    }
}
