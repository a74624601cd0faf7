// File: src/config.rs
// Purpose: Configuration parsing from rhtmx-forms.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Engine and server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormsConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub messages: MessagesConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub forms: FormsSection,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Accept `x-user-id` / `x-user-roles` from the client
    ///
    /// Only enable behind a proxy that sets these headers itself and strips
    /// any the client sent.
    #[serde(default)]
    pub trust_identity_headers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sql,
}

/// Where forms and entries are kept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// sqlx connection URL, used by the `sql` backend
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

/// Visitor-facing texts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Shown when a form cannot be resolved
    #[serde(default = "default_not_found")]
    pub not_found: String,

    /// Shown when a store fails during a submission
    #[serde(default = "default_generic_failure")]
    pub generic_failure: String,

    /// Used when a form has no success message of its own
    #[serde(default = "default_success")]
    pub default_success: String,

    #[serde(default = "default_submit_text")]
    pub submit_text: String,
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_from")]
    pub from: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Form definition sources
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormsSection {
    /// TOML file with `[[form]]` and `[[field_group]]` tables
    #[serde(default)]
    pub definitions: Option<String>,
}

// Default values
fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_not_found() -> String {
    "This form is unavailable.".to_string()
}

fn default_generic_failure() -> String {
    "Something went wrong. Please try again later.".to_string()
}

fn default_success() -> String {
    "Thank you for your submission.".to_string()
}

fn default_submit_text() -> String {
    "Submit".to_string()
}

fn default_from() -> String {
    "forms@localhost".to_string()
}

fn default_true() -> bool {
    true
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            trust_identity_headers: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: default_database_url(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            not_found: default_not_found(),
            generic_failure: default_generic_failure(),
            default_success: default_success(),
            submit_text: default_submit_text(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
            enabled: true,
        }
    }
}

impl FormsConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // If file doesn't exist or is empty, return default config
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: FormsConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Load configuration from default path (./rhtmx-forms.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("rhtmx-forms.toml")
    }
}
