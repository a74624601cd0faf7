// File: src/pipeline.rs
// Purpose: FormEngine orchestrating display, validation, entries and notifications

use crate::config::FormsConfig;
use crate::entry::{ContentEntryStore, Entry, EntryStore};
use crate::error::{FormError, Result};
use crate::field::{Field, SubmittedField};
use crate::form::Form;
use crate::hooks::Hooks;
use crate::notify::{self, interpolate, Mailer, TracingMailer};
use crate::registry::FormRegistry;
use crate::render::{default_renderer, render_notice, render_success, DisplayArgs, RenderContext};
use crate::request::{FormData, RequestContext, Visitor};
use crate::resolver::FormResolver;
use crate::restriction::{
    Decision, EvaluationMode, RestrictionContext, RestrictionEngine, RuleFactory,
};
use crate::schema::{form_fields, FieldSchemaProvider, MemorySchemaProvider};
use crate::store::ContentStore;
use crate::validation;
use serde_json::Value as JsonValue;
use std::io;
use std::sync::Arc;

/// What happened during a render call
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No form matched the identifier
    NotFound,
    /// A restriction refused display or submission
    Denied(String),
    /// The form was shown without processing a submission
    Displayed,
    /// The submission had field errors and the form was shown again
    Invalid(Vec<SubmittedField>),
    Submitted {
        entry: Option<Entry>,
        redirect: Option<String>,
    },
    /// A store failed; the visitor saw the generic failure message
    Failed(String),
}

/// Buffered markup of a render call and its outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub html: String,
    pub outcome: Outcome,
}

impl Rendered {
    /// Redirect target of a successful submission
    pub fn redirect(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Submitted {
                redirect: Some(url),
                ..
            } => Some(url),
            _ => None,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self.outcome, Outcome::Submitted { .. })
    }
}

/// A processed, accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub form: Form,
    pub fields: Vec<SubmittedField>,
    /// Stored entry; `None` when the form does not create entries
    pub entry: Option<Entry>,
}

type RegistrationHook = Box<dyn FnOnce(&mut FormRegistry) + Send>;

/// Collects collaborators, hooks and code-registered forms
///
/// Registration runs once in [`FormEngineBuilder::build`]; the registry is
/// read-only afterwards.
pub struct FormEngineBuilder {
    content: Arc<dyn ContentStore>,
    schema: Option<Arc<dyn FieldSchemaProvider>>,
    entries: Option<Arc<dyn EntryStore>>,
    mailer: Option<Arc<dyn Mailer>>,
    hooks: Hooks,
    restrictions: RestrictionEngine,
    config: FormsConfig,
    definitions: Vec<JsonValue>,
    registration_hooks: Vec<RegistrationHook>,
    default_renderer: bool,
}

impl FormEngineBuilder {
    pub fn new(content: Arc<dyn ContentStore>) -> Self {
        Self {
            content,
            schema: None,
            entries: None,
            mailer: None,
            hooks: Hooks::new(),
            restrictions: RestrictionEngine::new(),
            config: FormsConfig::default(),
            definitions: Vec::new(),
            registration_hooks: Vec::new(),
            default_renderer: true,
        }
    }

    pub fn schema(mut self, schema: Arc<dyn FieldSchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Entry store; defaults to entries kept in the content store
    pub fn entries(mut self, entries: Arc<dyn EntryStore>) -> Self {
        self.entries = Some(entries);
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Register a custom restriction type
    pub fn restriction_rule(mut self, kind: impl Into<String>, factory: RuleFactory) -> Self {
        self.restrictions = self.restrictions.with_rule(kind, factory);
        self
    }

    pub fn config(mut self, config: FormsConfig) -> Self {
        self.config = config;
        self
    }

    /// Queue a code-registered form definition
    pub fn register_form(mut self, definition: JsonValue) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Run a registration hook against the registry during `build`
    pub fn on_register<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut FormRegistry) + Send + 'static,
    {
        self.registration_hooks.push(Box::new(hook));
        self
    }

    /// Leave rendering entirely to the registered render handlers
    pub fn without_default_renderer(mut self) -> Self {
        self.default_renderer = false;
        self
    }

    pub fn build(self) -> FormEngine {
        let mut hooks = self.hooks;
        if self.default_renderer {
            hooks.render_handlers.insert(0, Arc::new(default_renderer));
        }
        let hooks = Arc::new(hooks);

        let mut registry = FormRegistry::new(FormResolver::new(hooks.clone()), self.content.clone());
        for definition in self.definitions {
            registry.register(definition);
        }
        for hook in self.registration_hooks {
            hook(&mut registry);
        }
        tracing::debug!("Form registry frozen with {} code-registered forms", registry.registered_count());

        let entries = self
            .entries
            .unwrap_or_else(|| Arc::new(ContentEntryStore::new(self.content.clone())));

        FormEngine {
            registry: Arc::new(registry),
            schema: self
                .schema
                .unwrap_or_else(|| Arc::new(MemorySchemaProvider::new())),
            entries,
            mailer: self.mailer.unwrap_or_else(|| Arc::new(TracingMailer)),
            restrictions: Arc::new(self.restrictions),
            hooks,
            config: Arc::new(self.config),
        }
    }
}

/// Renders forms and processes their submissions
#[derive(Clone)]
pub struct FormEngine {
    registry: Arc<FormRegistry>,
    schema: Arc<dyn FieldSchemaProvider>,
    entries: Arc<dyn EntryStore>,
    mailer: Arc<dyn Mailer>,
    restrictions: Arc<RestrictionEngine>,
    hooks: Arc<Hooks>,
    config: Arc<FormsConfig>,
}

impl FormEngine {
    pub fn builder(content: Arc<dyn ContentStore>) -> FormEngineBuilder {
        FormEngineBuilder::new(content)
    }

    pub fn registry(&self) -> &FormRegistry {
        &self.registry
    }

    pub fn config(&self) -> &FormsConfig {
        &self.config
    }

    pub async fn get_form(&self, identifier: &str) -> Result<Option<Form>> {
        self.registry.resolve(identifier).await
    }

    pub async fn get_forms(&self) -> Result<Vec<Form>> {
        self.registry.list_all().await
    }

    /// Schema fields of a form, in display order
    pub async fn get_form_fields(&self, identifier: &str) -> Result<Vec<Field>> {
        let form = self.require_form(identifier).await?;
        Ok(form_fields(self.schema.as_ref(), &form.key).await?)
    }

    /// Stored entries of a form, in creation order
    pub async fn entries(&self, identifier: &str) -> Result<Vec<Entry>> {
        let form = self.require_form(identifier).await?;
        Ok(self.entries.list_by_form(&form.key).await?)
    }

    async fn require_form(&self, identifier: &str) -> Result<Form> {
        self.registry
            .resolve(identifier)
            .await?
            .ok_or_else(|| FormError::NotFound(identifier.to_string()))
    }

    async fn check(&self, form: &Form, mode: EvaluationMode, visitor: &Visitor) -> Result<Decision> {
        let ctx = RestrictionContext::new(visitor, self.entries.as_ref());
        Ok(self.restrictions.evaluate(form, mode, &ctx).await?)
    }

    /// Render a form, processing the request first when it submits this form
    ///
    /// Never fails: every problem is reported through the outcome and shown
    /// as a message.
    pub async fn render_form(
        &self,
        identifier: &str,
        args: &DisplayArgs,
        request: &RequestContext,
    ) -> Rendered {
        match self.try_render(identifier, args, request).await {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::error!("Failed to render form {}: {}", identifier, e);
                self.failed()
            }
        }
    }

    /// Render a form and write the markup to `out` when `args.echo` is set
    pub async fn render_form_into<W: io::Write>(
        &self,
        identifier: &str,
        args: &DisplayArgs,
        request: &RequestContext,
        out: &mut W,
    ) -> io::Result<Rendered> {
        let rendered = self.render_form(identifier, args, request).await;
        if args.echo {
            out.write_all(rendered.html.as_bytes())?;
        }
        Ok(rendered)
    }

    async fn try_render(
        &self,
        identifier: &str,
        args: &DisplayArgs,
        request: &RequestContext,
    ) -> Result<Rendered> {
        let Some(form) = self.registry.resolve(identifier).await? else {
            tracing::debug!("Form {} not found", identifier);
            return Ok(Rendered {
                html: render_notice(&self.config.messages.not_found),
                outcome: Outcome::NotFound,
            });
        };

        if let Decision::Denied(reason) = self.check(&form, EvaluationMode::Display, &request.visitor).await? {
            return Ok(Rendered {
                html: render_notice(&reason),
                outcome: Outcome::Denied(reason),
            });
        }

        let fields: Vec<Field> = form_fields(self.schema.as_ref(), &form.key)
            .await?
            .into_iter()
            .filter(|field| !args.is_excluded(field))
            .collect();

        if !request.is_submission_for(&form.key) {
            return Ok(Rendered {
                html: self.render_markup(&form, &fields, args, &[], None),
                outcome: Outcome::Displayed,
            });
        }

        match self.process(&form, &fields, &request.form, &request.visitor).await {
            Ok(submission) => {
                if let Some(url) = &args.redirect {
                    return Ok(Rendered {
                        html: String::new(),
                        outcome: Outcome::Submitted {
                            entry: submission.entry,
                            redirect: Some(url.clone()),
                        },
                    });
                }

                let message = if form.display.success_message.is_empty() {
                    &self.config.messages.default_success
                } else {
                    &form.display.success_message
                };
                Ok(Rendered {
                    html: render_success(&interpolate(message, &submission.fields)),
                    outcome: Outcome::Submitted {
                        entry: submission.entry,
                        redirect: None,
                    },
                })
            }
            Err(FormError::Validation(submitted)) => Ok(Rendered {
                html: self.render_markup(&form, &fields, args, &submitted, None),
                outcome: Outcome::Invalid(submitted),
            }),
            Err(FormError::RestrictionDenied(reason)) => {
                let submitted = validation::collect(&fields, &request.form, &[]);
                Ok(Rendered {
                    html: self.render_markup(&form, &fields, args, &submitted, Some(reason.as_str())),
                    outcome: Outcome::Denied(reason),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Process a submission without rendering
    ///
    /// Display restrictions apply too, since the form could not have been
    /// shown otherwise.
    pub async fn submit(
        &self,
        identifier: &str,
        data: &FormData,
        visitor: &Visitor,
    ) -> Result<Submission> {
        let form = self.require_form(identifier).await?;

        if let Decision::Denied(reason) = self.check(&form, EvaluationMode::Display, visitor).await? {
            return Err(FormError::RestrictionDenied(reason));
        }

        let fields = form_fields(self.schema.as_ref(), &form.key).await?;
        self.process(&form, &fields, data, visitor).await
    }

    async fn process(
        &self,
        form: &Form,
        fields: &[Field],
        data: &FormData,
        visitor: &Visitor,
    ) -> Result<Submission> {
        let mut submitted = validation::validate(fields, data, &[]).fields;
        self.hooks.validate(form, &mut submitted);

        if submitted.iter().any(SubmittedField::has_errors) {
            tracing::debug!("Submission to form {} has field errors", form.key);
            return Err(FormError::Validation(submitted));
        }

        if let Decision::Denied(reason) = self.check(form, EvaluationMode::Submit, visitor).await? {
            tracing::warn!("Submission to form {} denied: {}", form.key, reason);
            return Err(FormError::RestrictionDenied(reason));
        }

        let entry = if form.create_entries {
            let identity = visitor.identity();
            let entry = self
                .entries
                .create(&form.key, identity.as_deref(), &submitted)
                .await?;
            tracing::info!("Created entry {} for form {}", entry.id, form.key);
            Some(entry)
        } else {
            None
        };

        if self.config.mail.enabled && !form.emails.is_empty() {
            let delivered =
                notify::dispatch(&form.emails, &submitted, self.mailer.as_ref(), &self.config.mail.from)
                    .await;
            tracing::debug!("Sent {} notification(s) for form {}", delivered, form.key);
        }

        self.hooks.submitted(form, &submitted, entry.as_ref());

        Ok(Submission {
            form: form.clone(),
            fields: submitted,
            entry,
        })
    }

    fn render_markup(
        &self,
        form: &Form,
        fields: &[Field],
        args: &DisplayArgs,
        submitted: &[SubmittedField],
        notice: Option<&str>,
    ) -> String {
        let submit_text = args
            .submit_text
            .as_deref()
            .unwrap_or(&self.config.messages.submit_text);
        let ctx = RenderContext {
            form,
            fields,
            args,
            submitted,
            notice,
            submit_text,
        };
        self.hooks.render(&ctx)
    }

    fn failed(&self) -> Rendered {
        let message = self.config.messages.generic_failure.clone();
        Rendered {
            html: render_notice(&message),
            outcome: Outcome::Failed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use crate::notify::MemoryMailer;
    use crate::store::MemoryContentStore;
    use crate::value::FieldValue;
    use anyhow::bail;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schema() -> Arc<MemorySchemaProvider> {
        Arc::new(MemorySchemaProvider::new().with_group(
            crate::field::FieldGroup {
                key: "group_contact".to_string(),
                title: "Contact".to_string(),
                forms: vec!["form_contact".to_string()],
            },
            vec![
                Field::new("field_name", "name", FieldType::Text).label("Name").required(),
                Field::new("field_email", "email", FieldType::Email).label("Email").required(),
            ],
        ))
    }

    fn engine(definition: JsonValue) -> FormEngine {
        FormEngine::builder(Arc::new(MemoryContentStore::new()))
            .schema(schema())
            .register_form(definition)
            .build()
    }

    fn post(pairs: Vec<(&str, &str)>) -> RequestContext {
        let mut pairs = pairs;
        pairs.push(("_form_key", "form_contact"));
        RequestContext::submission(FormData::from_pairs(pairs))
    }

    #[tokio::test]
    async fn test_display_renders_form() {
        let engine = engine(json!({"key": "form_contact", "title": "Contact"}));

        let rendered = engine
            .render_form("form_contact", &DisplayArgs::new(), &RequestContext::display())
            .await;

        assert_eq!(rendered.outcome, Outcome::Displayed);
        assert!(rendered.html.contains(r#"name="email""#));
    }

    #[tokio::test]
    async fn test_missing_form_renders_unavailable_message() {
        let engine = engine(json!({"key": "form_contact"}));

        let rendered = engine
            .render_form("form_missing", &DisplayArgs::new(), &RequestContext::display())
            .await;

        assert_eq!(rendered.outcome, Outcome::NotFound);
        assert!(rendered.html.contains("This form is unavailable."));
    }

    #[tokio::test]
    async fn test_submission_without_entries_succeeds() {
        let engine = engine(json!({
            "key": "form_contact",
            "display": {"success_message": "Thanks {field:name}"}
        }));

        let rendered = engine
            .render_form(
                "form_contact",
                &DisplayArgs::new(),
                &post(vec![("name", "Ada"), ("email", "ada@x.com")]),
            )
            .await;

        assert_eq!(
            rendered.outcome,
            Outcome::Submitted {
                entry: None,
                redirect: None
            }
        );
        assert!(rendered.html.contains("Thanks Ada"));
        assert!(engine.entries("form_contact").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_submission_rerenders_with_errors() {
        let engine = engine(json!({"key": "form_contact", "create_entries": true}));

        let rendered = engine
            .render_form("form_contact", &DisplayArgs::new(), &post(vec![("name", "Ada"), ("email", "")]))
            .await;

        match &rendered.outcome {
            Outcome::Invalid(fields) => {
                assert_eq!(fields[1].errors, vec!["Email value is required".to_string()]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(rendered.html.contains(r#"value="Ada""#));
        assert!(rendered.html.contains("Email value is required"));
        assert!(engine.entries("form_contact").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_and_echo() {
        let engine = engine(json!({"key": "form_contact", "create_entries": true}));
        let args = DisplayArgs::new().redirect("/thanks");
        let mut sink = Vec::new();

        let rendered = engine
            .render_form_into(
                "form_contact",
                &args,
                &post(vec![("name", "Ada"), ("email", "ada@x.com")]),
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(rendered.redirect(), Some("/thanks"));
        assert!(sink.is_empty());

        let quiet = DisplayArgs::new().echo(false);
        let mut sink = Vec::new();
        let rendered = engine
            .render_form_into("form_contact", &quiet, &RequestContext::display(), &mut sink)
            .await
            .unwrap();
        assert!(sink.is_empty());
        assert!(!rendered.html.is_empty());

        let mut sink = Vec::new();
        engine
            .render_form_into("form_contact", &DisplayArgs::new(), &RequestContext::display(), &mut sink)
            .await
            .unwrap();
        assert!(String::from_utf8(sink).unwrap().contains("<form"));
    }

    #[tokio::test]
    async fn test_submit_runs_hooks_and_notifications() {
        let mailer = Arc::new(MemoryMailer::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_by_hook = seen.clone();
        let hooks = Hooks::new()
            .with_validation_hook(|_, fields| {
                if let Some(name) = fields.iter_mut().find(|f| f.name == "name") {
                    if name.value == FieldValue::from("spam") {
                        name.add_error("Looks like spam");
                    }
                }
            })
            .with_submission_hook(move |form, _, entry| {
                assert_eq!(form.key, "form_contact");
                assert!(entry.is_some());
                seen_by_hook.fetch_add(1, Ordering::SeqCst);
            });
        let engine = FormEngine::builder(Arc::new(MemoryContentStore::new()))
            .schema(schema())
            .mailer(mailer.clone())
            .hooks(hooks)
            .register_form(json!({
                "key": "form_contact",
                "create_entries": true,
                "emails": [{
                    "name": "Confirmation",
                    "recipient": {"type": "field", "field": "email"},
                    "subject": "Hi {field:name}"
                }]
            }))
            .build();
        let visitor = Visitor::user("7");

        let spam = FormData::from_pairs(vec![("name", "spam"), ("email", "x@x.com")]);
        assert!(matches!(
            engine.submit("form_contact", &spam, &visitor).await,
            Err(FormError::Validation(_))
        ));

        let data = FormData::from_pairs(vec![("name", "Ada"), ("email", "ada@x.com")]);
        let submission = engine.submit("form_contact", &data, &visitor).await.unwrap();

        let entry = submission.entry.unwrap();
        assert_eq!(entry.identity.as_deref(), Some("user:7"));
        assert_eq!(entry.fields.get("field_email"), Some(&FieldValue::from("ada@x.com")));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.sent()[0].subject, "Hi Ada");
    }

    #[tokio::test]
    async fn test_submit_restriction_denial_keeps_values() {
        let engine = engine(json!({
            "key": "form_contact",
            "create_entries": true,
            "restrictions": [{"type": "once_per_identity"}]
        }));
        let request = post(vec![("name", "Ada"), ("email", "ada@x.com")])
            .with_visitor(Visitor::anonymous().with_session("s1"));

        let first = engine.render_form("form_contact", &DisplayArgs::new(), &request).await;
        assert!(first.is_submitted());

        let second = engine.render_form("form_contact", &DisplayArgs::new(), &request).await;
        assert_eq!(
            second.outcome,
            Outcome::Denied("You have already submitted this form.".to_string())
        );
        assert!(second.html.contains(r#"value="Ada""#));
        assert_eq!(engine.entries("form_contact").await.unwrap().len(), 1);
    }

    struct BrokenEntries;

    #[async_trait]
    impl EntryStore for BrokenEntries {
        async fn create(
            &self,
            _form_key: &str,
            _identity: Option<&str>,
            _fields: &[SubmittedField],
        ) -> anyhow::Result<Entry> {
            bail!("disk full")
        }

        async fn count_by_form_and_identity(&self, _: &str, _: &str) -> anyhow::Result<u64> {
            Ok(0)
        }

        async fn count_by_form(&self, _: &str) -> anyhow::Result<u64> {
            Ok(0)
        }

        async fn list_by_form(&self, _: &str) -> anyhow::Result<Vec<Entry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_renders_generic_message() {
        let engine = FormEngine::builder(Arc::new(MemoryContentStore::new()))
            .schema(schema())
            .entries(Arc::new(BrokenEntries))
            .register_form(json!({"key": "form_contact", "create_entries": true}))
            .build();

        let rendered = engine
            .render_form(
                "form_contact",
                &DisplayArgs::new(),
                &post(vec![("name", "Ada"), ("email", "ada@x.com")]),
            )
            .await;

        assert!(matches!(rendered.outcome, Outcome::Failed(_)));
        assert!(rendered.html.contains("Something went wrong"));
    }

    struct RefusingMailer;

    #[async_trait]
    impl Mailer for RefusingMailer {
        async fn send(&self, _email: &notify::OutgoingEmail) -> anyhow::Result<()> {
            bail!("smtp relay refused connection")
        }
    }

    #[tokio::test]
    async fn test_mail_failure_keeps_entry_and_success() {
        let engine = FormEngine::builder(Arc::new(MemoryContentStore::new()))
            .schema(schema())
            .mailer(Arc::new(RefusingMailer))
            .register_form(json!({
                "key": "form_contact",
                "create_entries": true,
                "display": {"success_message": "Thanks {field:name}"},
                "emails": [{
                    "name": "Admin",
                    "recipient": {"type": "custom", "address": "admin@x.com"},
                    "subject": "New entry"
                }]
            }))
            .build();

        let rendered = engine
            .render_form(
                "form_contact",
                &DisplayArgs::new(),
                &post(vec![("name", "Ada"), ("email", "ada@x.com")]),
            )
            .await;

        assert!(matches!(
            rendered.outcome,
            Outcome::Submitted { entry: Some(_), redirect: None }
        ));
        assert!(rendered.html.contains("Thanks Ada"));
        assert!(!rendered.html.contains("smtp relay"));
        assert!(!rendered.html.contains("Something went wrong"));
        assert_eq!(engine.entries("form_contact").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_render_handlers_are_concatenated() {
        let hooks = Hooks::new()
            .with_render_handler(|ctx| format!("<p>{}</p>", ctx.form.key))
            .with_render_handler(|ctx| format!("<p>{} fields</p>", ctx.fields.len()));
        let engine = FormEngine::builder(Arc::new(MemoryContentStore::new()))
            .schema(schema())
            .hooks(hooks)
            .without_default_renderer()
            .register_form(json!({"key": "form_contact"}))
            .build();

        let args = DisplayArgs::new().exclude("email");
        let rendered = engine
            .render_form("form_contact", &args, &RequestContext::display())
            .await;

        assert_eq!(rendered.html, "<p>form_contact</p><p>1 fields</p>");
    }
}
