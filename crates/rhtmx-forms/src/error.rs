// File: src/error.rs
// Purpose: Error kinds surfaced by the form engine

use crate::field::SubmittedField;

/// Errors produced while resolving, authorizing or processing a form
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    /// A definition without a usable `key`
    #[error("form definition is missing a key")]
    DefinitionInvalid,

    #[error("form not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    RestrictionDenied(String),

    /// Field-level errors; the submission is re-rendered, not aborted
    #[error("submission has {} invalid field(s)", invalid_count(.0))]
    Validation(Vec<SubmittedField>),

    /// Content or entry store failure, never retried
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

fn invalid_count(fields: &[SubmittedField]) -> usize {
    fields.iter().filter(|f| f.has_errors()).count()
}

pub type Result<T> = std::result::Result<T, FormError>;
