// End-to-end behaviour of the form engine over the in-memory stores
// Run with: cargo test -p rhtmx-forms --test submission_pipeline

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rhtmx_forms::resolver::FORM_KEY_META;
use rhtmx_forms::store::FORM_POST_TYPE;
use rhtmx_forms::{
    ContentStore, Decision, DisplayArgs, Field, FieldGroup, FieldType, FieldValue, Form,
    FormData, FormEngine, FormError, MemoryContentStore, MemorySchemaProvider, NewPost, Outcome,
    RequestContext, RestrictionContext, RestrictionRule, RuleFactory, Visitor,
};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn contact_schema() -> Arc<MemorySchemaProvider> {
    Arc::new(MemorySchemaProvider::new().with_group(
        FieldGroup {
            key: "group_contact".to_string(),
            title: "Contact".to_string(),
            forms: vec!["contact".to_string()],
        },
        vec![
            Field::new("name", "name", FieldType::Text).label("Name").required(),
            Field::new("email", "email", FieldType::Email).label("Email").required(),
        ],
    ))
}

fn contact_engine(definition: serde_json::Value) -> FormEngine {
    FormEngine::builder(Arc::new(MemoryContentStore::new()))
        .schema(contact_schema())
        .register_form(definition)
        .build()
}

fn submission(name: &str, email: &str) -> RequestContext {
    RequestContext::submission(FormData::from_pairs(vec![
        ("_form_key", "contact"),
        ("name", name),
        ("email", email),
    ]))
}

#[tokio::test]
async fn test_definitions_without_key_are_dropped() {
    let engine = FormEngine::builder(Arc::new(MemoryContentStore::new()))
        .register_form(json!({"title": "No key"}))
        .register_form(json!({"key": ""}))
        .on_register(|registry| {
            assert!(registry.register(json!({"display": {}})).is_none());
        })
        .build();

    assert_eq!(engine.registry().registered_count(), 0);
    assert!(engine.get_forms().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_registered_form_resolves_to_defaulted_record() {
    let registered = Arc::new(std::sync::Mutex::new(None::<Form>));
    let slot = registered.clone();
    let engine = FormEngine::builder(Arc::new(MemoryContentStore::new()))
        .on_register(move |registry| {
            let form = registry.register(json!({"key": "contact", "title": "Contact us"}));
            *slot.lock().unwrap() = form;
        })
        .build();

    let expected = registered.lock().unwrap().clone().unwrap();
    let first = engine.get_form("contact").await.unwrap().unwrap();
    let second = engine.get_form("contact").await.unwrap().unwrap();

    assert_eq!(first, expected);
    assert_eq!(first, second);
    assert_eq!(first.title, "Contact us");
    assert!(!first.create_entries);
}

#[tokio::test]
async fn test_contact_submission_creates_entry() {
    let engine = contact_engine(json!({
        "key": "contact",
        "create_entries": true,
        "display": {"success_message": "Thanks, {field:name}!"}
    }));

    let rendered = engine
        .render_form("contact", &DisplayArgs::new(), &submission("Ada", "ada@x.com"))
        .await;

    let entry = match rendered.outcome {
        Outcome::Submitted { entry: Some(entry), redirect: None } => entry,
        other => panic!("unexpected outcome {:?}", other),
    };
    let expected: BTreeMap<String, FieldValue> = [
        ("email".to_string(), FieldValue::from("ada@x.com")),
        ("name".to_string(), FieldValue::from("Ada")),
    ]
    .into_iter()
    .collect();
    assert_eq!(entry.fields, expected);
    assert!(rendered.html.contains("Thanks, Ada!"));
    assert!(!rendered.html.contains("<form"));

    assert_eq!(engine.entries("contact").await.unwrap(), vec![entry]);
}

#[tokio::test]
async fn test_contact_submission_missing_name_rerenders() {
    let engine = contact_engine(json!({"key": "contact", "create_entries": true}));

    let rendered = engine
        .render_form("contact", &DisplayArgs::new(), &submission("", "ada@x.com"))
        .await;

    let fields = match rendered.outcome {
        Outcome::Invalid(fields) => fields,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(fields[0].errors, vec!["Name value is required".to_string()]);
    assert!(fields[1].errors.is_empty());
    assert!(rendered.html.contains("<form"));
    assert!(rendered.html.contains(r#"value="ada@x.com""#));
    assert!(engine.entries("contact").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_form_without_entries_still_succeeds() {
    let engine = contact_engine(json!({"key": "contact", "create_entries": false}));

    let rendered = engine
        .render_form("contact", &DisplayArgs::new(), &submission("Ada", "ada@x.com"))
        .await;

    assert_eq!(
        rendered.outcome,
        Outcome::Submitted {
            entry: None,
            redirect: None
        }
    );
    assert!(rendered.html.contains("Thank you for your submission."));
    assert!(engine.entries("contact").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_required_email_yields_single_error() {
    let schema = Arc::new(MemorySchemaProvider::new().with_group(
        FieldGroup {
            key: "group_newsletter".to_string(),
            title: String::new(),
            forms: vec!["newsletter".to_string()],
        },
        vec![Field::new("email", "email", FieldType::Email).required()],
    ));
    let engine = FormEngine::builder(Arc::new(MemoryContentStore::new()))
        .schema(schema)
        .register_form(json!({"key": "newsletter", "create_entries": true}))
        .build();

    let data = FormData::from_pairs(vec![("email", "")]);
    let fields = match engine.submit("newsletter", &data, &Visitor::anonymous()).await {
        Err(FormError::Validation(fields)) => fields,
        other => panic!("unexpected result {:?}", other),
    };

    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].errors.len(), 1);
    assert!(engine.entries("newsletter").await.unwrap().is_empty());
}

struct Counted {
    decision: Decision,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl RestrictionRule for Counted {
    async fn evaluate(&self, _form: &Form, _ctx: &RestrictionContext<'_>) -> anyhow::Result<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.decision.clone())
    }
}

fn counted(decision: Decision, calls: Arc<AtomicUsize>) -> RuleFactory {
    Arc::new(
        move |_params: &Map<String, JsonValue>| -> anyhow::Result<Box<dyn RestrictionRule>> {
            Ok(Box::new(Counted {
                decision: decision.clone(),
                calls: calls.clone(),
            }))
        },
    )
}

#[tokio::test]
async fn test_second_restriction_denies_and_undeclared_never_runs() {
    let allow_calls = Arc::new(AtomicUsize::new(0));
    let deny_calls = Arc::new(AtomicUsize::new(0));
    let other_calls = Arc::new(AtomicUsize::new(0));

    let engine = FormEngine::builder(Arc::new(MemoryContentStore::new()))
        .schema(contact_schema())
        .restriction_rule("allow_all", counted(Decision::Allowed, allow_calls.clone()))
        .restriction_rule(
            "deny_all",
            counted(Decision::Denied("Closed for maintenance".into()), deny_calls.clone()),
        )
        .restriction_rule("never_declared", counted(Decision::Allowed, other_calls.clone()))
        .register_form(json!({
            "key": "contact",
            "create_entries": true,
            "restrictions": [{"type": "allow_all"}, {"type": "deny_all"}]
        }))
        .build();

    let data = FormData::from_pairs(vec![("name", "Ada"), ("email", "ada@x.com")]);
    let result = engine.submit("contact", &data, &Visitor::anonymous()).await;

    assert!(matches!(
        result,
        Err(FormError::RestrictionDenied(reason)) if reason == "Closed for maintenance"
    ));
    assert_eq!(allow_calls.load(Ordering::SeqCst), 1);
    assert_eq!(deny_calls.load(Ordering::SeqCst), 1);
    assert_eq!(other_calls.load(Ordering::SeqCst), 0);
    assert!(engine.entries("contact").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_code_registered_form_wins_over_store() {
    let store = Arc::new(MemoryContentStore::new());
    store
        .create_post(NewPost::new(FORM_POST_TYPE, "Stored contact").meta(FORM_KEY_META, "contact"))
        .await
        .unwrap();
    let engine = FormEngine::builder(store.clone())
        .register_form(json!({"key": "contact", "title": "Code contact"}))
        .build();

    let form = engine.registry().resolve_by_key("contact").await.unwrap().unwrap();
    assert_eq!(form.title, "Code contact");

    let titles: Vec<String> = engine
        .get_forms()
        .await
        .unwrap()
        .into_iter()
        .map(|form| form.title)
        .collect();
    assert_eq!(titles, vec!["Stored contact", "Code contact"]);
}

#[tokio::test]
async fn test_store_backed_form_by_id_and_key() {
    let store = Arc::new(MemoryContentStore::new());
    let post = store
        .create_post(
            NewPost::new(FORM_POST_TYPE, "Survey")
                .meta(FORM_KEY_META, "survey")
                .field("form_create_entries", json!(true))
                .field("form_success_message", json!("Noted")),
        )
        .await
        .unwrap();
    let engine = FormEngine::builder(store.clone()).build();

    let by_key = engine.get_form("survey").await.unwrap().unwrap();
    let by_id = engine.get_form(&post.id.to_string()).await.unwrap().unwrap();

    assert_eq!(by_key, by_id);
    assert_eq!(by_key.id, Some(post.id));
    assert!(by_key.create_entries);

    let rendered = engine
        .render_form(&post.id.to_string(), &DisplayArgs::new(), &RequestContext::display())
        .await;
    assert!(rendered.html.contains(r#"value="survey""#));
}

#[tokio::test]
async fn test_display_restriction_hides_form() {
    let engine = contact_engine(json!({
        "key": "contact",
        "restrictions": [{"type": "require_login", "message": "Members only"}]
    }));

    let anonymous = engine
        .render_form("contact", &DisplayArgs::new(), &RequestContext::display())
        .await;
    assert_eq!(anonymous.outcome, Outcome::Denied("Members only".to_string()));
    assert!(!anonymous.html.contains("<form"));

    let member = RequestContext::display().with_visitor(Visitor::user("42"));
    let rendered = engine.render_form("contact", &DisplayArgs::new(), &member).await;
    assert_eq!(rendered.outcome, Outcome::Displayed);
}
