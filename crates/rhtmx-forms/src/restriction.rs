// File: src/restriction.rs
// Purpose: Access rules deciding whether a form may be displayed or submitted

use crate::entry::EntryStore;
use crate::form::Form;
use crate::request::Visitor;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const LOGIN_REQUIRED: &str = "You must be logged in to use this form.";
const ROLE_REQUIRED: &str = "You do not have permission to use this form.";
const NOT_OPEN_YET: &str = "This form is not open yet.";
const CLOSED: &str = "This form is closed.";
const LIMIT_REACHED: &str = "This form no longer accepts submissions.";
const ALREADY_SUBMITTED: &str = "You have already submitted this form.";
const UNKNOWN_RULE: &str = "This form is unavailable.";

/// Which question a restriction answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// May the visitor see the form at all
    Display,
    /// May this submission be accepted
    Submit,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationMode::Display => write!(f, "display"),
            EvaluationMode::Submit => write!(f, "submit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// What a rule may look at while deciding
pub struct RestrictionContext<'a> {
    pub visitor: &'a Visitor,
    pub entries: &'a dyn EntryStore,
    pub now: DateTime<Utc>,
}

impl<'a> RestrictionContext<'a> {
    pub fn new(visitor: &'a Visitor, entries: &'a dyn EntryStore) -> Self {
        Self {
            visitor,
            entries,
            now: Utc::now(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// A single kind of access rule
#[async_trait]
pub trait RestrictionRule: Send + Sync {
    /// Rules not applicable to a mode are skipped in that mode
    fn applies_to(&self, _mode: EvaluationMode) -> bool {
        true
    }

    async fn evaluate(&self, form: &Form, ctx: &RestrictionContext<'_>) -> Result<Decision>;
}

/// Built-in restriction types, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuiltinRestriction {
    RequireLogin {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Role {
        roles: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Open between `start` and `end`, either bound optional
    Schedule {
        #[serde(default)]
        start: Option<DateTime<Utc>>,
        #[serde(default)]
        end: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Closes once the form has stored `max` entries
    EntryLimit {
        max: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    OncePerIdentity {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

fn denied(message: &Option<String>, fallback: &str) -> Decision {
    Decision::Denied(message.clone().unwrap_or_else(|| fallback.to_string()))
}

#[async_trait]
impl RestrictionRule for BuiltinRestriction {
    fn applies_to(&self, mode: EvaluationMode) -> bool {
        match self {
            BuiltinRestriction::OncePerIdentity { .. } => mode == EvaluationMode::Submit,
            _ => true,
        }
    }

    async fn evaluate(&self, form: &Form, ctx: &RestrictionContext<'_>) -> Result<Decision> {
        let decision = match self {
            BuiltinRestriction::RequireLogin { message } => {
                if ctx.visitor.is_logged_in() {
                    Decision::Allowed
                } else {
                    denied(message, LOGIN_REQUIRED)
                }
            }
            BuiltinRestriction::Role { roles, message } => {
                if roles.iter().any(|role| ctx.visitor.has_role(role)) {
                    Decision::Allowed
                } else {
                    denied(message, ROLE_REQUIRED)
                }
            }
            BuiltinRestriction::Schedule {
                start,
                end,
                message,
            } => match (start, end) {
                (Some(start), _) if ctx.now < *start => denied(message, NOT_OPEN_YET),
                (_, Some(end)) if ctx.now > *end => denied(message, CLOSED),
                _ => Decision::Allowed,
            },
            BuiltinRestriction::EntryLimit { max, message } => {
                let count = ctx.entries.count_by_form(&form.key).await?;
                if count < *max {
                    Decision::Allowed
                } else {
                    denied(message, LIMIT_REACHED)
                }
            }
            BuiltinRestriction::OncePerIdentity { message } => match ctx.visitor.identity() {
                Some(identity) => {
                    let count = ctx
                        .entries
                        .count_by_form_and_identity(&form.key, &identity)
                        .await?;
                    if count == 0 {
                        Decision::Allowed
                    } else {
                        denied(message, ALREADY_SUBMITTED)
                    }
                }
                // Nothing to attribute the entry to
                None => denied(message, ALREADY_SUBMITTED),
            },
        };
        Ok(decision)
    }
}

/// A restriction of a type the engine resolves through a registered factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRestriction {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub params: Map<String, JsonValue>,
}

/// A restriction declared on a form
///
/// Anything that does not parse as a built-in (including a built-in type with
/// malformed parameters) is kept as `Custom` and looked up by its type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Restriction {
    Builtin(BuiltinRestriction),
    Custom(CustomRestriction),
}

impl Restriction {
    pub fn kind(&self) -> String {
        match self {
            Restriction::Builtin(builtin) => serde_json::to_value(builtin)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
                .unwrap_or_default(),
            Restriction::Custom(custom) => custom.kind.clone(),
        }
    }
}

impl From<BuiltinRestriction> for Restriction {
    fn from(builtin: BuiltinRestriction) -> Self {
        Restriction::Builtin(builtin)
    }
}

/// Builds a rule from a custom restriction's parameters
pub type RuleFactory =
    Arc<dyn Fn(&Map<String, JsonValue>) -> Result<Box<dyn RestrictionRule>> + Send + Sync>;

/// Evaluates a form's restrictions in declaration order
#[derive(Clone, Default)]
pub struct RestrictionEngine {
    factories: HashMap<String, RuleFactory>,
}

impl RestrictionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom restriction type (functional builder pattern)
    pub fn with_rule(mut self, kind: impl Into<String>, factory: RuleFactory) -> Self {
        self.factories.insert(kind.into(), factory);
        self
    }

    /// Evaluate every restriction applicable to `mode`, stopping at the first
    /// denial. Unknown types deny.
    pub async fn evaluate(
        &self,
        form: &Form,
        mode: EvaluationMode,
        ctx: &RestrictionContext<'_>,
    ) -> Result<Decision> {
        for restriction in &form.restrictions {
            let decision = match restriction {
                Restriction::Builtin(rule) => Self::run(rule, form, mode, ctx).await?,
                Restriction::Custom(custom) => match self.factories.get(&custom.kind) {
                    Some(factory) => match factory(&custom.params) {
                        Ok(rule) => Self::run(rule.as_ref(), form, mode, ctx).await?,
                        Err(e) => {
                            tracing::warn!(
                                "Invalid parameters for restriction '{}' on form {}: {}",
                                custom.kind,
                                form.key,
                                e
                            );
                            Decision::Denied(UNKNOWN_RULE.to_string())
                        }
                    },
                    None => {
                        tracing::warn!(
                            "Unknown restriction type '{}' on form {}",
                            custom.kind,
                            form.key
                        );
                        Decision::Denied(UNKNOWN_RULE.to_string())
                    }
                },
            };

            if let Decision::Denied(reason) = &decision {
                tracing::debug!(
                    "Form {} denied in {} mode by '{}': {}",
                    form.key,
                    mode,
                    restriction.kind(),
                    reason
                );
                return Ok(decision);
            }
        }

        Ok(Decision::Allowed)
    }

    async fn run(
        rule: &dyn RestrictionRule,
        form: &Form,
        mode: EvaluationMode,
        ctx: &RestrictionContext<'_>,
    ) -> Result<Decision> {
        if !rule.applies_to(mode) {
            return Ok(Decision::Allowed);
        }
        rule.evaluate(form, ctx).await
    }
}
