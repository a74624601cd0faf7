// File: src/registry.rs
// Purpose: Single lookup over code-registered and store-backed forms

use crate::error::Result;
use crate::form::{is_valid_form_key, Form};
use crate::resolver::{FormResolver, FORM_KEY_META};
use crate::store::{ContentStore, FORM_POST_TYPE};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Code-registered forms plus the store holding the rest
///
/// Registration happens before the registry is shared; afterwards it is only
/// read. Code-registered forms win over store-backed forms with the same key.
pub struct FormRegistry {
    registered: Vec<Form>,
    resolver: FormResolver,
    content: Arc<dyn ContentStore>,
}

impl FormRegistry {
    pub fn new(resolver: FormResolver, content: Arc<dyn ContentStore>) -> Self {
        Self {
            registered: Vec::new(),
            resolver,
            content,
        }
    }

    /// Register a form from a raw definition
    ///
    /// Definitions without a usable key are dropped and `None` is returned.
    /// Any non-empty key is accepted, but only keys passing
    /// [`is_valid_form_key`] can be looked up through [`FormRegistry::resolve`];
    /// others still show up in [`FormRegistry::list_all`].
    pub fn register(&mut self, definition: JsonValue) -> Option<Form> {
        match self.resolver.resolve_definition(definition) {
            Ok(form) => {
                if !is_valid_form_key(&form.key) {
                    tracing::debug!(
                        "Form key {:?} is not an identifier; the form is listed but cannot be resolved",
                        form.key
                    );
                }
                tracing::debug!("Registered form {}", form.key);
                self.registered.push(form.clone());
                Some(form)
            }
            Err(e) => {
                tracing::debug!("Dropped form definition: {}", e);
                None
            }
        }
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub async fn resolve_by_key(&self, key: &str) -> Result<Option<Form>> {
        if let Some(form) = self.registered.iter().find(|form| form.key == key) {
            return self.resolver.normalize(form).map(Some);
        }

        let posts = self
            .content
            .query_by_type_and_meta(FORM_POST_TYPE, FORM_KEY_META, key)
            .await?;
        match posts.first() {
            Some(post) => self.resolver.from_post(post, self.content.as_ref()).await,
            None => {
                tracing::debug!("No form with key {}", key);
                Ok(None)
            }
        }
    }

    pub async fn resolve_by_id(&self, id: i64) -> Result<Option<Form>> {
        match self.content.get_post(id).await? {
            Some(post) => self.resolver.from_post(&post, self.content.as_ref()).await,
            None => Ok(None),
        }
    }

    /// Resolve a form key or a numeric post id
    pub async fn resolve(&self, identifier: &str) -> Result<Option<Form>> {
        if is_valid_form_key(identifier) {
            return self.resolve_by_key(identifier).await;
        }
        match identifier.parse::<i64>() {
            Ok(id) if identifier.chars().all(|c| c.is_ascii_digit()) => {
                self.resolve_by_id(id).await
            }
            _ => Ok(None),
        }
    }

    /// Store-backed forms first, then code-registered forms
    pub async fn list_all(&self) -> Result<Vec<Form>> {
        let mut forms = Vec::new();

        for post in self.content.query_by_type(FORM_POST_TYPE).await? {
            if let Some(form) = self.resolver.from_post(&post, self.content.as_ref()).await? {
                forms.push(form);
            }
        }
        for form in &self.registered {
            forms.push(self.resolver.normalize(form)?);
        }

        Ok(forms)
    }
}
