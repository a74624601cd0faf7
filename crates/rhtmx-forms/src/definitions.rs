// File: src/definitions.rs
// Purpose: Load form definitions and field groups from a TOML file

use crate::field::{Field, FieldGroup};
use crate::schema::MemorySchemaProvider;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;

/// A field group together with its fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldGroupDefinition {
    pub key: String,

    #[serde(default)]
    pub title: String,

    /// Form keys the group is attached to
    #[serde(default)]
    pub forms: Vec<String>,

    #[serde(default)]
    pub fields: Vec<Field>,
}

/// Contents of a definitions file
///
/// Forms stay raw so that key-less definitions are dropped by registration
/// rather than failing the whole file. Dates (schedule bounds) must be
/// quoted RFC 3339 strings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormDefinitions {
    #[serde(default)]
    pub form: Vec<JsonValue>,

    #[serde(default)]
    pub field_group: Vec<FieldGroupDefinition>,
}

impl FormDefinitions {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read form definitions: {:?}", path))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse form definitions: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Schema provider holding every field group of the file
    pub fn schema(&self) -> MemorySchemaProvider {
        self.field_group
            .iter()
            .fold(MemorySchemaProvider::new(), |provider, group| {
                provider.with_group(
                    FieldGroup {
                        key: group.key.clone(),
                        title: group.title.clone(),
                        forms: group.forms.clone(),
                    },
                    group.fields.clone(),
                )
            })
    }
}
