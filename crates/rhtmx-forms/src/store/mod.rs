//! Content store abstraction
//!
//! Forms and entries live in a generic post store: every record is a `Post`
//! with string metadata and JSON field values. The engine only talks to the
//! [`ContentStore`] trait, so any storage engine can sit behind it.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod memory;
pub mod sql;

pub use memory::MemoryContentStore;
pub use sql::SqlContentStore;

/// Post type of store-backed form definitions
pub const FORM_POST_TYPE: &str = "form";

/// Post type of persisted entries
pub const ENTRY_POST_TYPE: &str = "entry";

/// A record in the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub post_type: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A post to be created, with everything that must become visible at once
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub post_type: String,
    pub title: String,
    pub meta: Vec<(String, String)>,
    pub fields: Vec<(String, JsonValue)>,
}

impl NewPost {
    pub fn new(post_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            post_type: post_type.into(),
            title: title.into(),
            meta: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }
}

/// Trait for content store backends
///
/// `create_post` must be atomic: a failure leaves no partially visible post.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Get a post by id
    async fn get_post(&self, id: i64) -> Result<Option<Post>>;

    /// All posts of a type, in the store's natural (creation) order
    async fn query_by_type(&self, post_type: &str) -> Result<Vec<Post>>;

    /// Posts of a type whose metadata `meta_key` equals `meta_value`
    async fn query_by_type_and_meta(
        &self,
        post_type: &str,
        meta_key: &str,
        meta_value: &str,
    ) -> Result<Vec<Post>>;

    /// Get a metadata value
    async fn get_meta(&self, post_id: i64, key: &str) -> Result<Option<String>>;

    /// Get a single field value stored on a post
    async fn get_field_value(&self, field_name: &str, post_id: i64) -> Result<Option<JsonValue>>;

    /// All field values of a post in the order they were written
    async fn get_field_values(&self, post_id: i64) -> Result<Vec<(String, JsonValue)>>;

    /// Create a post together with its metadata and field values
    async fn create_post(&self, post: NewPost) -> Result<Post>;

    /// Get storage backend name
    fn name(&self) -> &'static str;
}
