// File: src/notify.rs
// Purpose: Email notifications sent after a successful submission

use crate::field::{extract_field_value, SubmittedField};
use anyhow::{bail, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(all_fields|field:([A-Za-z0-9_\-]+))\}").unwrap());

fn default_active() -> bool {
    true
}

/// Where a notification goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recipient {
    /// The address submitted in a field, looked up by key or name
    Field { field: String },
    Custom { address: String },
}

/// A notification rule declared on a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailNotification {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_active")]
    pub active: bool,

    pub recipient: Recipient,

    /// Sender address; the mail config default applies when empty
    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub content: String,
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Mailer that only logs what it would send
#[derive(Debug, Clone, Default)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!("Mail to {} from {}: {}", email.to, email.from, email.subject);
        tracing::debug!("{}", email.body);
        Ok(())
    }
}

/// Mailer that keeps every message in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        match self.sent.lock() {
            Ok(mut sent) => {
                sent.push(email.clone());
                Ok(())
            }
            Err(_) => bail!("mail outbox lock poisoned"),
        }
    }
}

/// Replace `{field:<key-or-name>}` and `{all_fields}` placeholders
///
/// Unknown fields interpolate as empty strings.
pub fn interpolate(template: &str, fields: &[SubmittedField]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match caps.get(2) {
            Some(name) => extract_field_value(name.as_str(), fields)
                .map(|value| value.to_display_string())
                .unwrap_or_default(),
            None => all_fields(fields),
        })
        .into_owned()
}

fn all_fields(fields: &[SubmittedField]) -> String {
    fields
        .iter()
        .map(|field| {
            let label = if field.label.is_empty() {
                &field.name
            } else {
                &field.label
            };
            format!("{}: {}", label, field.value.to_display_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl EmailNotification {
    /// Render this notification for a submission
    ///
    /// Fails when the recipient cannot be determined.
    pub fn render(&self, fields: &[SubmittedField], default_from: &str) -> Result<OutgoingEmail> {
        let to = match &self.recipient {
            Recipient::Field { field } => extract_field_value(field, fields)
                .map(|value| value.to_display_string())
                .unwrap_or_default(),
            Recipient::Custom { address } => interpolate(address, fields),
        };
        let to = to.trim().to_string();
        if to.is_empty() {
            bail!("notification '{}' has no recipient", self.name);
        }

        let from = if self.from.is_empty() {
            default_from.to_string()
        } else {
            interpolate(&self.from, fields)
        };

        Ok(OutgoingEmail {
            to,
            from,
            subject: interpolate(&self.subject, fields),
            body: interpolate(&self.content, fields),
        })
    }
}

/// Send every active notification; failures are logged and skipped
///
/// Returns how many messages were handed to the mailer successfully.
pub async fn dispatch(
    notifications: &[EmailNotification],
    fields: &[SubmittedField],
    mailer: &dyn Mailer,
    default_from: &str,
) -> usize {
    let mut delivered = 0;

    for notification in notifications.iter().filter(|n| n.active) {
        let email = match notification.render(fields, default_from) {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!("Skipping notification '{}': {}", notification.name, e);
                continue;
            }
        };

        match mailer.send(&email).await {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(
                "Failed to send notification '{}' to {}: {}",
                notification.name,
                email.to,
                e
            ),
        }
    }

    delivered
}
