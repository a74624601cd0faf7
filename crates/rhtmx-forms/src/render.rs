// File: src/render.rs
// Purpose: Display arguments, render context and the default maud form renderer

use crate::field::{Field, FieldType, SubmittedField};
use crate::form::Form;
use crate::request::FORM_KEY_INPUT;
use crate::value::FieldValue;
use maud::{html, Markup};
use std::collections::HashMap;

/// Options of a single render call
#[derive(Debug, Clone)]
pub struct DisplayArgs {
    /// Also write the markup to the caller's sink
    pub echo: bool,
    pub display_title: bool,
    pub display_description: bool,
    /// Overrides the configured submit button text
    pub submit_text: Option<String>,
    /// Pre-filled values by field key or name
    pub values: HashMap<String, FieldValue>,
    /// Field keys or names left out of rendering and validation
    pub exclude_fields: Vec<String>,
    /// Where to send the visitor after a successful submission
    pub redirect: Option<String>,
    /// Form action URL; the current URL when unset
    pub action: Option<String>,
}

impl Default for DisplayArgs {
    fn default() -> Self {
        Self {
            echo: true,
            display_title: true,
            display_description: true,
            submit_text: None,
            values: HashMap::new(),
            exclude_fields: Vec::new(),
            redirect: None,
            action: None,
        }
    }
}

impl DisplayArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn value(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.exclude_fields.push(field.into());
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.redirect = Some(url.into());
        self
    }

    pub fn is_excluded(&self, field: &Field) -> bool {
        self.exclude_fields.iter().any(|excluded| field.matches(excluded))
    }
}

/// Everything a render handler sees
pub struct RenderContext<'a> {
    pub form: &'a Form,
    /// Schema fields, excluded ones already removed
    pub fields: &'a [Field],
    pub args: &'a DisplayArgs,
    /// Values and errors of a rejected submission; empty on first display
    pub submitted: &'a [SubmittedField],
    /// Message shown above the fields, e.g. a submit-time denial
    pub notice: Option<&'a str>,
    pub submit_text: &'a str,
}

impl<'a> RenderContext<'a> {
    /// Submitted value if any, otherwise the pre-filled one
    pub fn value_for(&self, field: &Field) -> FieldValue {
        self.submitted
            .iter()
            .find(|submitted| submitted.key == field.key)
            .map(|submitted| submitted.value.clone())
            .or_else(|| {
                self.args
                    .values
                    .get(&field.key)
                    .or_else(|| self.args.values.get(&field.name))
                    .cloned()
            })
            .unwrap_or_default()
    }

    pub fn errors_for(&self, field: &Field) -> &'a [String] {
        self.submitted
            .iter()
            .find(|submitted| submitted.key == field.key)
            .map(|submitted| submitted.errors.as_slice())
            .unwrap_or(&[])
    }
}

/// The built-in render handler
pub fn default_renderer(ctx: &RenderContext<'_>) -> String {
    render_form(ctx).into_string()
}

fn render_form(ctx: &RenderContext<'_>) -> Markup {
    let form = ctx.form;
    html! {
        form class="rhtmx-form" method="post" action=[ctx.args.action.as_deref()] data-form-key=(form.key) {
            @if ctx.args.display_title && !form.title.is_empty() {
                h2 class="form-title" { (form.title) }
            }
            @if ctx.args.display_description && !form.display.description.is_empty() {
                p class="form-description" { (form.display.description) }
            }
            @if let Some(notice) = ctx.notice {
                div class="form-notice" role="alert" { (notice) }
            }
            input type="hidden" name=(FORM_KEY_INPUT) value=(form.key);
            @for field in ctx.fields {
                (render_field(field, &ctx.value_for(field), ctx.errors_for(field)))
            }
            button type="submit" { (ctx.submit_text) }
        }
    }
}

fn input_type(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::Email => "email",
        FieldType::Url => "url",
        FieldType::Number => "number",
        FieldType::Password => "password",
        _ => "text",
    }
}

fn render_field(field: &Field, value: &FieldValue, errors: &[String]) -> Markup {
    let text = value.to_display_string();
    let selected = value.as_list();
    let invalid = !errors.is_empty();

    html! {
        div class="form-field" data-field-type=(field.field_type.as_str()) data-invalid[invalid] {
            @if field.field_type != FieldType::TrueFalse {
                label for=(field.key) {
                    (field.display_label())
                    @if field.required { span class="required" { "*" } }
                }
            }
            @match &field.field_type {
                FieldType::Textarea => {
                    textarea id=(field.key) name=(field.name) required[field.required] { (text) }
                }
                FieldType::Select => {
                    select id=(field.key) name=(field.name) required[field.required] {
                        @for choice in &field.rules.choices {
                            option value=(choice) selected[selected.contains(choice)] { (choice) }
                        }
                    }
                }
                FieldType::Radio => {
                    @for choice in &field.rules.choices {
                        label {
                            input type="radio" name=(field.name) value=(choice) checked[selected.contains(choice)];
                            " " (choice)
                        }
                    }
                }
                FieldType::Checkbox => {
                    @for choice in &field.rules.choices {
                        label {
                            input type="checkbox" name=(format!("{}[]", field.name)) value=(choice) checked[selected.contains(choice)];
                            " " (choice)
                        }
                    }
                }
                FieldType::TrueFalse => {
                    label {
                        input id=(field.key) type="checkbox" name=(field.name) value="1" checked[*value == FieldValue::Bool(true)];
                        " " (field.display_label())
                        @if field.required { span class="required" { "*" } }
                    }
                }
                other => {
                    input id=(field.key) type=(input_type(other)) name=(field.name) value=(text) required[field.required];
                }
            }
            @if !field.instructions.is_empty() {
                p class="field-instructions" { (field.instructions) }
            }
            @if invalid {
                ul class="field-errors" {
                    @for error in errors {
                        li { (error) }
                    }
                }
            }
        }
    }
}

/// Markup shown in place of the form after a successful submission
pub fn render_success(message: &str) -> String {
    html! {
        div class="form-success" { (message) }
    }
    .into_string()
}

/// Markup shown instead of a form that cannot be displayed
pub fn render_notice(message: &str) -> String {
    html! {
        div class="form-notice" role="alert" { (message) }
    }
    .into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldRules;
    use serde_json::json;

    fn form() -> Form {
        serde_json::from_value(json!({
            "key": "form_contact",
            "title": "Contact",
            "display": {"description": "Say hi <3"}
        }))
        .unwrap()
    }

    fn fields() -> Vec<Field> {
        vec![
            Field::new("field_name", "name", FieldType::Text).label("Name").required(),
            Field::new("field_color", "color", FieldType::Select).rules(FieldRules {
                choices: vec!["red".to_string(), "blue".to_string()],
                ..Default::default()
            }),
        ]
    }

    #[test]
    fn test_default_renderer_outputs_form_and_hidden_key() {
        let form = form();
        let fields = fields();
        let args = DisplayArgs::new().value("color", "blue");
        let ctx = RenderContext {
            form: &form,
            fields: &fields,
            args: &args,
            submitted: &[],
            notice: None,
            submit_text: "Send",
        };

        let html = default_renderer(&ctx);

        assert!(html.contains(r#"<form class="rhtmx-form" method="post" data-form-key="form_contact">"#));
        assert!(html.contains(r#"<input type="hidden" name="_form_key" value="form_contact">"#));
        assert!(html.contains("<h2 class=\"form-title\">Contact</h2>"));
        assert!(html.contains("Say hi &lt;3"));
        assert!(html.contains(r#"<option value="blue" selected>blue</option>"#));
        assert!(html.contains(r#"<button type="submit">Send</button>"#));
    }

    #[test]
    fn test_errors_and_submitted_values_are_shown() {
        let form = form();
        let fields = fields();
        let args = DisplayArgs {
            display_title: false,
            ..DisplayArgs::default()
        };
        let mut name = SubmittedField::new("field_name", "name", "Name", "Ad\"a".into());
        name.add_error("Name is too short");
        let submitted = vec![name];
        let ctx = RenderContext {
            form: &form,
            fields: &fields,
            args: &args,
            submitted: &submitted,
            notice: Some("Please fix the errors below"),
            submit_text: "Submit",
        };

        let html = default_renderer(&ctx);

        assert!(!html.contains("form-title"));
        assert!(html.contains(r#"value="Ad&quot;a""#));
        assert!(html.contains("<li>Name is too short</li>"));
        assert!(html.contains("Please fix the errors below"));
    }

    #[test]
    fn test_success_and_notice_markup() {
        assert_eq!(
            render_success("Thanks!"),
            r#"<div class="form-success">Thanks!</div>"#
        );
        assert_eq!(
            render_notice("Closed"),
            r#"<div class="form-notice" role="alert">Closed</div>"#
        );
    }
}
