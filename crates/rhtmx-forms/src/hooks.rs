// File: src/hooks.rs
// Purpose: Extension points invoked at fixed steps of resolution and submission

use crate::entry::Entry;
use crate::field::SubmittedField;
use crate::form::Form;
use crate::render::RenderContext;
use crate::store::Post;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

/// Adds or changes keys of the default form template
pub type DefaultsFilter = Arc<dyn Fn(&mut Map<String, JsonValue>) + Send + Sync>;

/// Rewrites a store-backed form after it was mapped from its post
pub type FormFilter = Arc<dyn Fn(Form, &Post) -> Form + Send + Sync>;

/// Produces markup for a form; outputs of all handlers are concatenated
pub type RenderHandler = Arc<dyn Fn(&RenderContext<'_>) -> String + Send + Sync>;

/// Adds submission-level errors after the per-field checks ran
pub type ValidationHook = Arc<dyn Fn(&Form, &mut Vec<SubmittedField>) + Send + Sync>;

/// Observes a successful submission, with the entry when one was stored
pub type SubmissionHook = Arc<dyn Fn(&Form, &[SubmittedField], Option<&Entry>) + Send + Sync>;

/// Which store-backed forms a form filter applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterScope {
    All,
    Id(i64),
    Key(String),
}

/// Every callback list the engine consults
///
/// Lists run in registration order. Form filters additionally run by scope,
/// general before specific: `All`, then `Id`, then `Key`.
#[derive(Clone, Default)]
pub struct Hooks {
    pub defaults_filters: Vec<DefaultsFilter>,
    pub form_filters: Vec<(FilterScope, FormFilter)>,
    pub render_handlers: Vec<RenderHandler>,
    pub validation_hooks: Vec<ValidationHook>,
    pub submission_hooks: Vec<SubmissionHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&mut Map<String, JsonValue>) + Send + Sync + 'static,
    {
        self.defaults_filters.push(Arc::new(filter));
        self
    }

    pub fn with_form_filter<F>(mut self, scope: FilterScope, filter: F) -> Self
    where
        F: Fn(Form, &Post) -> Form + Send + Sync + 'static,
    {
        self.form_filters.push((scope, Arc::new(filter)));
        self
    }

    pub fn with_render_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RenderContext<'_>) -> String + Send + Sync + 'static,
    {
        self.render_handlers.push(Arc::new(handler));
        self
    }

    pub fn with_validation_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Form, &mut Vec<SubmittedField>) + Send + Sync + 'static,
    {
        self.validation_hooks.push(Arc::new(hook));
        self
    }

    pub fn with_submission_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Form, &[SubmittedField], Option<&Entry>) + Send + Sync + 'static,
    {
        self.submission_hooks.push(Arc::new(hook));
        self
    }

    /// Apply the defaults filters to a template
    pub fn filter_defaults(&self, template: &mut Map<String, JsonValue>) {
        for filter in &self.defaults_filters {
            filter(template);
        }
    }

    /// Apply the form filters matching a store-backed form
    ///
    /// The key scope is matched against the key as rewritten by the earlier
    /// scopes.
    pub fn filter_form(&self, mut form: Form, post: &Post) -> Form {
        for (scope, filter) in &self.form_filters {
            if *scope == FilterScope::All {
                form = filter(form, post);
            }
        }
        for (scope, filter) in &self.form_filters {
            if *scope == FilterScope::Id(post.id) {
                form = filter(form, post);
            }
        }
        for (scope, filter) in &self.form_filters {
            if matches!(scope, FilterScope::Key(key) if *key == form.key) {
                form = filter(form, post);
            }
        }
        form
    }

    pub fn render(&self, ctx: &RenderContext<'_>) -> String {
        self.render_handlers.iter().map(|handler| handler(ctx)).collect()
    }

    pub fn validate(&self, form: &Form, fields: &mut Vec<SubmittedField>) {
        for hook in &self.validation_hooks {
            hook(form, fields);
        }
    }

    pub fn submitted(&self, form: &Form, fields: &[SubmittedField], entry: Option<&Entry>) {
        for hook in &self.submission_hooks {
            hook(form, fields, entry);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("defaults_filters", &self.defaults_filters.len())
            .field("form_filters", &self.form_filters.len())
            .field("render_handlers", &self.render_handlers.len())
            .field("validation_hooks", &self.validation_hooks.len())
            .field("submission_hooks", &self.submission_hooks.len())
            .finish()
    }
}
