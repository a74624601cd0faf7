// File: src/schema.rs
// Purpose: Field schema lookup for forms

use crate::field::{Field, FieldGroup};
use anyhow::Result;
use async_trait::async_trait;

/// Supplies the field definitions attached to a form
#[async_trait]
pub trait FieldSchemaProvider: Send + Sync {
    /// Field groups whose location includes the form key, in display order
    async fn get_field_groups(&self, form_key: &str) -> Result<Vec<FieldGroup>>;

    /// Fields of a group, in display order
    async fn get_fields(&self, group: &FieldGroup) -> Result<Vec<Field>>;
}

/// Every field of every group attached to a form, flattened in order
pub async fn form_fields(provider: &dyn FieldSchemaProvider, form_key: &str) -> Result<Vec<Field>> {
    let mut fields = Vec::new();
    for group in provider.get_field_groups(form_key).await? {
        fields.extend(provider.get_fields(&group).await?);
    }
    Ok(fields)
}

/// Schema provider backed by groups held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaProvider {
    groups: Vec<(FieldGroup, Vec<Field>)>,
}

impl MemorySchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: FieldGroup, fields: Vec<Field>) -> Self {
        self.groups.push((group, fields));
        self
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[async_trait]
impl FieldSchemaProvider for MemorySchemaProvider {
    async fn get_field_groups(&self, form_key: &str) -> Result<Vec<FieldGroup>> {
        Ok(self
            .groups
            .iter()
            .filter(|(group, _)| group.forms.iter().any(|key| key == form_key))
            .map(|(group, _)| group.clone())
            .collect())
    }

    async fn get_fields(&self, group: &FieldGroup) -> Result<Vec<Field>> {
        Ok(self
            .groups
            .iter()
            .find(|(candidate, _)| candidate.key == group.key)
            .map(|(_, fields)| fields.clone())
            .unwrap_or_default())
    }
}
