// File: src/app.rs
// Purpose: Router, request context extraction and visitor identification
//
// Visitors are anonymous sessions unless `server.trust_identity_headers` is
// set. With it set, `x-user-id` and `x-user-roles` are taken as given, so
// they must come from a trusted proxy that strips client-supplied copies.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use maud::{html, PreEscaped, DOCTYPE};
use rhtmx_forms::{DisplayArgs, FormData, FormEngine, FormError, Outcome, RequestContext, Visitor};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use tower_http::trace::TraceLayer;

/// Cookie carrying the anonymous session token
pub const SESSION_COOKIE: &str = "forms_session";

/// Role allowed to read entries
const ENTRIES_ROLE: &str = "administrator";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: FormEngine,
    pub trust_identity_headers: bool,
}

pub fn router(engine: FormEngine) -> Router {
    Router::new()
        .route("/forms", get(list_forms))
        .route("/forms/:id", get(form_page).post(form_page))
        .route("/forms/:id/fields", get(form_fields))
        .route("/forms/:id/entries", get(form_entries))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            trust_identity_headers: engine.config().server.trust_identity_headers,
            engine,
        })
}

async fn list_forms(State(state): State<AppState>) -> Response {
    match state.engine.get_forms().await {
        Ok(forms) => Json(forms).into_response(),
        Err(e) => error_response(e),
    }
}

async fn form_fields(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.get_form_fields(&id).await {
        Ok(fields) => Json(fields).into_response(),
        Err(e) => error_response(e),
    }
}

async fn form_entries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = create_request_context(Method::GET, headers, Bytes::new());
    let (visitor, _) = identify_visitor(&ctx, state.trust_identity_headers);
    if !visitor.has_role(ENTRIES_ROLE) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "entries are only visible to administrators" })),
        )
            .into_response();
    }

    match state.engine.entries(&id).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => error_response(e),
    }
}

async fn form_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let ctx = create_request_context(method, headers, body);
    let (visitor, issued_session) = identify_visitor(&ctx, state.trust_identity_headers);
    let ctx = ctx.with_visitor(visitor);

    let mut args = DisplayArgs::new();
    args.redirect = query.get("redirect").filter(|url| is_local_path(url)).cloned();

    let rendered = state.engine.render_form(&id, &args, &ctx).await;

    let mut response = match rendered.redirect() {
        Some(url) => Redirect::to(url).into_response(),
        None => (status_for(&rendered.outcome), Html(page(&rendered.html))).into_response(),
    };

    if let Some(session) = issued_session {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, session);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }

    response
}

fn status_for(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::NotFound => StatusCode::NOT_FOUND,
        Outcome::Denied(_) => StatusCode::FORBIDDEN,
        Outcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Outcome::Displayed | Outcome::Invalid(_) | Outcome::Submitted { .. } => StatusCode::OK,
    }
}

fn page(body: &str) -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                title { "Forms" }
            }
            body {
                (PreEscaped(body))
            }
        }
    }
    .into_string()
}

fn error_response(error: FormError) -> Response {
    let status = match &error {
        FormError::NotFound(_) => StatusCode::NOT_FOUND,
        FormError::RestrictionDenied(_) => StatusCode::FORBIDDEN,
        FormError::DefinitionInvalid | FormError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FormError::Store(e) => {
            tracing::error!("Store failure: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

/// Only same-site absolute paths are accepted as redirect targets
fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//")
}

/// Decode an `application/x-www-form-urlencoded` component
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

pub fn create_request_context(
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> RequestContext {
    let form = if method == Method::POST {
        match headers.get(header::CONTENT_TYPE).and_then(|ct| ct.to_str().ok()) {
            Some(ct) if ct.contains("application/json") => serde_json::from_slice::<JsonValue>(&body)
                .map(FormData::from_json)
                .unwrap_or_else(|_| FormData::new()),
            Some(ct) if ct.contains("application/x-www-form-urlencoded") => {
                let form_str = String::from_utf8_lossy(&body);
                FormData::from_pairs(
                    form_str
                        .split('&')
                        .filter(|pair| !pair.is_empty())
                        .map(|pair| match pair.split_once('=') {
                            Some((k, v)) => (decode_component(k), decode_component(v)),
                            None => (decode_component(pair), String::new()),
                        }),
                )
            }
            _ => FormData::new(),
        }
    } else {
        FormData::new()
    };

    RequestContext::new(method, form, headers)
}

/// Build the visitor from identity headers and the session cookie
///
/// Identity headers are ignored unless `trust_headers` is set. Returns a
/// freshly issued session token when the request had none.
pub fn identify_visitor(ctx: &RequestContext, trust_headers: bool) -> (Visitor, Option<String>) {
    let header = |name: &str| if trust_headers { ctx.get_header(name) } else { None };

    let mut visitor = match header("x-user-id").map(str::trim) {
        Some(id) if !id.is_empty() => Visitor::user(id),
        _ => Visitor::anonymous(),
    };

    if let Some(roles) = header("x-user-roles") {
        visitor = visitor.with_roles(
            roles
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty()),
        );
    }

    match ctx.get_cookie(SESSION_COOKIE).filter(|s| !s.is_empty()) {
        Some(session) => (visitor.with_session(session.clone()), None),
        None => {
            let session = uuid::Uuid::new_v4().to_string();
            (visitor.with_session(session.clone()), Some(session))
        }
    }
}
