// RHTMX Forms - form definitions, restrictions, submissions and entries
// Forms come from code or from a content store and share one pipeline

pub mod error;
pub mod value;
pub mod field;
pub mod form;

// Storage
pub mod store;
pub mod entry;
pub mod schema;

// Resolution
pub mod hooks;
pub mod resolver;
pub mod registry;

// Submission pipeline
pub mod request;
pub mod restriction;
pub mod validation;
pub mod notify;
pub mod render;
pub mod pipeline;

// Configuration
pub mod config;
pub mod definitions;

// Re-export core types
pub use error::{FormError, Result};
pub use value::FieldValue;
pub use field::{extract_field_value, Field, FieldGroup, FieldRules, FieldType, SubmittedField};
pub use form::{is_valid_form_key, Form, FormDisplay};

// Re-export collaborators
pub use store::{ContentStore, MemoryContentStore, NewPost, Post, SqlContentStore};
pub use entry::{ContentEntryStore, Entry, EntryStore};
pub use schema::{FieldSchemaProvider, MemorySchemaProvider};
pub use notify::{EmailNotification, Mailer, MemoryMailer, OutgoingEmail, Recipient, TracingMailer};

// Re-export engine types
pub use hooks::{FilterScope, Hooks};
pub use resolver::FormResolver;
pub use registry::FormRegistry;
pub use request::{FormData, RequestContext, Visitor};
pub use restriction::{
    BuiltinRestriction, CustomRestriction, Decision, EvaluationMode, Restriction,
    RestrictionContext, RestrictionEngine, RestrictionRule, RuleFactory,
};
pub use render::{DisplayArgs, RenderContext};
pub use pipeline::{FormEngine, FormEngineBuilder, Outcome, Rendered, Submission};
pub use config::FormsConfig;
pub use definitions::FormDefinitions;
