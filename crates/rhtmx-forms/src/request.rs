// File: src/request.rs
// Purpose: Request context with visitor identity, headers, cookies, and form data

use axum::http::{HeaderMap, Method};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Name of the hidden input that tells which form a POST belongs to
pub const FORM_KEY_INPUT: &str = "_form_key";

/// Who is making the request, as established by the host application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visitor {
    /// Account id of a logged-in user
    pub user_id: Option<String>,

    /// Roles held by the logged-in user
    pub roles: Vec<String>,

    /// Anonymous session token
    pub session: Option<String>,
}

impl Visitor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Opaque token used to attribute entries; accounts win over sessions
    pub fn identity(&self) -> Option<String> {
        self.user_id
            .as_ref()
            .map(|id| format!("user:{}", id))
            .or_else(|| self.session.as_ref().map(|s| format!("session:{}", s)))
    }
}

/// Request context passed through the submission pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method (GET, POST, ...)
    pub method: Method,

    /// Form data from POST requests
    pub form: FormData,

    /// Request headers
    pub headers: HeaderMap,

    /// Parsed cookies
    pub cookies: HashMap<String, String>,

    pub visitor: Visitor,
}

impl RequestContext {
    /// Create a new request context
    pub fn new(method: Method, form: FormData, headers: HeaderMap) -> Self {
        let cookies = Self::parse_cookies(&headers);

        Self {
            method,
            form,
            headers,
            cookies,
            visitor: Visitor::anonymous(),
        }
    }

    /// A plain GET display request
    pub fn display() -> Self {
        Self::new(Method::GET, FormData::new(), HeaderMap::new())
    }

    /// A POST carrying the given form data
    pub fn submission(form: FormData) -> Self {
        Self::new(Method::POST, form, HeaderMap::new())
    }

    pub fn with_visitor(mut self, visitor: Visitor) -> Self {
        self.visitor = visitor;
        self
    }

    /// Parse cookies from Cookie header
    fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
        let mut cookies = HashMap::new();

        if let Some(cookie_header) = headers.get("cookie") {
            if let Ok(cookie_str) = cookie_header.to_str() {
                for cookie in cookie_str.split(';') {
                    let cookie = cookie.trim();
                    if let Some((key, value)) = cookie.split_once('=') {
                        cookies.insert(key.to_string(), value.to_string());
                    }
                }
            }
        }

        cookies
    }

    /// Get a cookie value
    pub fn get_cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }

    /// Get a header value
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    /// Whether this request posts the form with the given key
    pub fn is_submission_for(&self, form_key: &str) -> bool {
        self.is_post() && self.form.get(FORM_KEY_INPUT).map(String::as_str) == Some(form_key)
    }
}

/// Form data from POST requests
///
/// Repeated keys (checkbox groups, `name[]` inputs) keep every value.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    fields: HashMap<String, Vec<String>>,
    raw_json: Option<JsonValue>,
}

impl FormData {
    /// Create empty form data
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from decoded `(name, value)` pairs with automatic trimming
    ///
    /// A trailing `[]` on a name is dropped so `colors[]=a&colors[]=b`
    /// collects under `colors`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            let key: String = key.into();
            let key = key.strip_suffix("[]").map(str::to_string).unwrap_or(key);
            let value: String = value.into();
            fields.entry(key).or_default().push(value.trim().to_string());
        }

        Self {
            fields,
            raw_json: None,
        }
    }

    /// Create from JSON
    pub fn from_json(json: JsonValue) -> Self {
        let mut fields = HashMap::new();

        // If JSON is an object, extract fields
        if let JsonValue::Object(map) = &json {
            for (key, value) in map {
                let values = match value {
                    JsonValue::String(s) => vec![s.trim().to_string()],
                    JsonValue::Array(items) => items
                        .iter()
                        .map(|item| match item.as_str() {
                            Some(s) => s.trim().to_string(),
                            None => item.to_string(),
                        })
                        .collect(),
                    JsonValue::Null => Vec::new(),
                    other => vec![other.to_string()],
                };
                fields.insert(key.clone(), values);
            }
        }

        Self {
            fields,
            raw_json: Some(json),
        }
    }

    /// Get the first value of a field
    pub fn get(&self, key: &str) -> Option<&String> {
        self.fields.get(key)?.first()
    }

    /// Get every value posted under a field
    pub fn get_all(&self, key: &str) -> Option<&[String]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    /// Check if a field exists
    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Get raw JSON if available
    pub fn json(&self) -> Option<&JsonValue> {
        self.raw_json.as_ref()
    }

    /// Check if form is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.raw_json.is_none()
    }
}
