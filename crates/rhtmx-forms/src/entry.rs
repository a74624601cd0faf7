// File: src/entry.rs
// Purpose: Persisted submissions and the entry store contract

use crate::field::SubmittedField;
use crate::store::{ContentStore, NewPost, Post, ENTRY_POST_TYPE};
use crate::value::FieldValue;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata key holding the owning form's key
pub const ENTRY_FORM_META: &str = "entry_form";

/// Metadata key holding the submitter identity token
pub const ENTRY_IDENTITY_META: &str = "entry_identity";

/// Metadata key holding the RFC 3339 submission time
pub const ENTRY_DATE_META: &str = "entry_submission_date";

/// A validated submission persisted for a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub form_key: String,
    pub identity: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Field key to stored value
    pub fields: BTreeMap<String, FieldValue>,
}

/// Storage for entries
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Persist a new entry; values are stored keyed by field key
    async fn create(
        &self,
        form_key: &str,
        identity: Option<&str>,
        fields: &[SubmittedField],
    ) -> Result<Entry>;

    /// Count entries a given identity submitted to a form
    async fn count_by_form_and_identity(&self, form_key: &str, identity: &str) -> Result<u64>;

    /// Count every entry of a form
    async fn count_by_form(&self, form_key: &str) -> Result<u64>;

    /// Entries of a form in creation order
    async fn list_by_form(&self, form_key: &str) -> Result<Vec<Entry>>;
}

/// Entry store persisting entries as `entry` posts of a content store
#[derive(Clone)]
pub struct ContentEntryStore {
    content: Arc<dyn ContentStore>,
}

impl ContentEntryStore {
    pub fn new(content: Arc<dyn ContentStore>) -> Self {
        Self { content }
    }

    async fn load(&self, post: &Post) -> Result<Entry> {
        let form_key = self
            .content
            .get_meta(post.id, ENTRY_FORM_META)
            .await?
            .with_context(|| format!("Entry {} has no owning form", post.id))?;
        let identity = self.content.get_meta(post.id, ENTRY_IDENTITY_META).await?;

        let fields = self
            .content
            .get_field_values(post.id)
            .await?
            .into_iter()
            .map(|(key, value)| (key, FieldValue::from_json(value)))
            .collect();

        Ok(Entry {
            id: post.id,
            form_key,
            identity,
            created_at: post.created_at,
            fields,
        })
    }
}

#[async_trait]
impl EntryStore for ContentEntryStore {
    async fn create(
        &self,
        form_key: &str,
        identity: Option<&str>,
        fields: &[SubmittedField],
    ) -> Result<Entry> {
        let submitted_at = Utc::now();

        let mut new_post = NewPost::new(ENTRY_POST_TYPE, format!("{} entry", form_key))
            .meta(ENTRY_FORM_META, form_key)
            .meta(ENTRY_DATE_META, submitted_at.to_rfc3339());
        if let Some(identity) = identity {
            new_post = new_post.meta(ENTRY_IDENTITY_META, identity);
        }
        for field in fields {
            new_post = new_post.field(field.key.clone(), field.value.to_json());
        }

        let post = self
            .content
            .create_post(new_post)
            .await
            .with_context(|| format!("Failed to persist entry for form {}", form_key))?;

        Ok(Entry {
            id: post.id,
            form_key: form_key.to_string(),
            identity: identity.map(str::to_string),
            created_at: post.created_at,
            fields: fields
                .iter()
                .map(|field| (field.key.clone(), field.value.clone()))
                .collect(),
        })
    }

    async fn count_by_form_and_identity(&self, form_key: &str, identity: &str) -> Result<u64> {
        let posts = self
            .content
            .query_by_type_and_meta(ENTRY_POST_TYPE, ENTRY_FORM_META, form_key)
            .await?;

        let mut count = 0;
        for post in posts {
            let owner = self.content.get_meta(post.id, ENTRY_IDENTITY_META).await?;
            if owner.as_deref() == Some(identity) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_by_form(&self, form_key: &str) -> Result<u64> {
        let posts = self
            .content
            .query_by_type_and_meta(ENTRY_POST_TYPE, ENTRY_FORM_META, form_key)
            .await?;
        Ok(posts.len() as u64)
    }

    async fn list_by_form(&self, form_key: &str) -> Result<Vec<Entry>> {
        let posts = self
            .content
            .query_by_type_and_meta(ENTRY_POST_TYPE, ENTRY_FORM_META, form_key)
            .await?;

        let mut entries = Vec::with_capacity(posts.len());
        for post in &posts {
            entries.push(self.load(post).await?);
        }
        Ok(entries)
    }
}
