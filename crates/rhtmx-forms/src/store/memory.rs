//! In-memory content store

use crate::store::{ContentStore, NewPost, Post};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    posts: Vec<Post>,
    meta: HashMap<i64, Vec<(String, String)>>,
    fields: HashMap<i64, Vec<(String, JsonValue)>>,
}

/// In-memory content store
///
/// Fast but non-persistent - everything is lost on restart. Posts are created
/// under a single write lock, so readers never see a post without its
/// metadata.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of posts of every type
    pub async fn size(&self) -> usize {
        self.tables.read().await.posts.len()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables.posts.iter().find(|post| post.id == id).cloned())
    }

    async fn query_by_type(&self, post_type: &str) -> Result<Vec<Post>> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .iter()
            .filter(|post| post.post_type == post_type)
            .cloned()
            .collect())
    }

    async fn query_by_type_and_meta(
        &self,
        post_type: &str,
        meta_key: &str,
        meta_value: &str,
    ) -> Result<Vec<Post>> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .iter()
            .filter(|post| post.post_type == post_type)
            .filter(|post| {
                tables
                    .meta
                    .get(&post.id)
                    .map(|meta| meta.iter().any(|(k, v)| k == meta_key && v == meta_value))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn get_meta(&self, post_id: i64, key: &str) -> Result<Option<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .meta
            .get(&post_id)
            .and_then(|meta| meta.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.clone()))
    }

    async fn get_field_value(&self, field_name: &str, post_id: i64) -> Result<Option<JsonValue>> {
        let tables = self.tables.read().await;
        Ok(tables
            .fields
            .get(&post_id)
            .and_then(|fields| fields.iter().find(|(name, _)| name == field_name))
            .map(|(_, value)| value.clone()))
    }

    async fn get_field_values(&self, post_id: i64) -> Result<Vec<(String, JsonValue)>> {
        let tables = self.tables.read().await;
        Ok(tables.fields.get(&post_id).cloned().unwrap_or_default())
    }

    async fn create_post(&self, new_post: NewPost) -> Result<Post> {
        let mut tables = self.tables.write().await;
        tables.last_id += 1;

        let post = Post {
            id: tables.last_id,
            post_type: new_post.post_type,
            title: new_post.title,
            created_at: Utc::now(),
        };

        tables.meta.insert(post.id, new_post.meta);
        tables.fields.insert(post.id, new_post.fields);
        tables.posts.push(post.clone());

        Ok(post)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FORM_POST_TYPE;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_create_and_read() {
        let store = MemoryContentStore::new();
        assert_eq!(store.name(), "memory");
        let post = store
            .create_post(
                NewPost::new(FORM_POST_TYPE, "Contact")
                    .meta("form_key", "form_contact")
                    .field("form_description", json!("Say hello")),
            )
            .await
            .unwrap();

        assert_eq!(post.id, 1);
        assert_eq!(store.get_post(1).await.unwrap(), Some(post.clone()));
        assert_eq!(
            store.get_meta(post.id, "form_key").await.unwrap(),
            Some("form_contact".to_string())
        );
        assert_eq!(
            store.get_field_value("form_description", post.id).await.unwrap(),
            Some(json!("Say hello"))
        );
        assert_eq!(store.get_field_value("missing", post.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_query_by_meta() {
        let store = MemoryContentStore::new();
        store
            .create_post(NewPost::new(FORM_POST_TYPE, "A").meta("form_key", "form_a"))
            .await
            .unwrap();
        store
            .create_post(NewPost::new(FORM_POST_TYPE, "B").meta("form_key", "form_b"))
            .await
            .unwrap();
        store
            .create_post(NewPost::new("page", "C").meta("form_key", "form_a"))
            .await
            .unwrap();

        let found = store
            .query_by_type_and_meta(FORM_POST_TYPE, "form_key", "form_a")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "A");

        let forms = store.query_by_type(FORM_POST_TYPE).await.unwrap();
        let titles: Vec<&str> = forms.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(store.size().await, 3);
    }
}
