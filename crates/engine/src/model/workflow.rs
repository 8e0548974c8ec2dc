//! Workflow definition types.
//!
//! A definition is the static, reusable description of trigger conditions
//! and an ordered list of typed steps. Step configuration is stored as a
//! free-form JSON document and parsed into a typed [`Step`] fresh on every
//! execution pass, so definition edits take effect at the next step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::StepError;

/// Comparison operator used by trigger clauses and condition steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equals => write!(f, "equals"),
            Self::NotEquals => write!(f, "not_equals"),
            Self::Contains => write!(f, "contains"),
            Self::NotContains => write!(f, "not_contains"),
            Self::IsEmpty => write!(f, "is_empty"),
            Self::IsNotEmpty => write!(f, "is_not_empty"),
            Self::GreaterThan => write!(f, "greater_than"),
            Self::LessThan => write!(f, "less_than"),
        }
    }
}

/// One condition clause of a trigger predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionClause {
    /// Dotted path into the event payload.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Event type plus AND-combined clauses gating automatic execution start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPredicate {
    /// Event type this workflow reacts to (e.g. "contact_created").
    pub event_type: String,

    /// Clauses evaluated against the event payload; empty means
    /// "always matches".
    #[serde(default)]
    pub conditions: Vec<ConditionClause>,
}

/// Stored wire shape of one workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step kind (e.g. "send_email", "wait", "condition").
    pub kind: String,

    /// Kind-specific configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl StepSpec {
    pub fn new(kind: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

/// Configuration for a `send_email` step.
///
/// Either an inline subject/body pair or a named template reference;
/// inline values win when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Named template resolved through the template store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Configuration for a `send_sms` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendSmsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Configuration for a `wait` step: a relative duration or an absolute
/// wake time. Exactly one should be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

/// Configuration for a `condition` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Dotted field path: `contact.<field>` or `context.<field>`.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,

    /// Step index to jump to when the condition holds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_true: Option<usize>,
    /// Step index to jump to when it does not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_false: Option<usize>,
}

/// Configuration for a `call_ai` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAiConfig {
    /// Prompt template rendered against `{contact, context}`.
    pub prompt: String,

    /// Context key the response is also stored under, in addition to the
    /// `aiResponses` log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

/// Configuration for an `update_crm` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCrmConfig {
    /// Field name to new value. Unknown fields are silently ignored.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Configuration for a `webhook` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

/// A workflow step with parsed, typed configuration.
///
/// `Unknown` preserves unrecognized kinds so that executing one produces the
/// documented terminal failure instead of a deserialization error at load
/// time.
#[derive(Debug, Clone)]
pub enum Step {
    SendEmail(SendEmailConfig),
    SendSms(SendSmsConfig),
    Wait(WaitConfig),
    Condition(ConditionConfig),
    CallAi(CallAiConfig),
    UpdateCrm(UpdateCrmConfig),
    Webhook(WebhookConfig),
    Unknown { kind: String },
}

impl Step {
    /// Parse a stored spec into a typed step.
    ///
    /// A recognized kind with malformed configuration is a configuration
    /// error (terminal); an unrecognized kind parses into [`Step::Unknown`].
    pub fn parse(spec: &StepSpec) -> Result<Step, StepError> {
        fn config<T: serde::de::DeserializeOwned>(
            kind: &str,
            value: &serde_json::Value,
        ) -> Result<T, StepError> {
            serde_json::from_value(value.clone())
                .map_err(|e| StepError::Config(format!("invalid {} config: {}", kind, e)))
        }

        match spec.kind.as_str() {
            "send_email" => Ok(Step::SendEmail(config("send_email", &spec.config)?)),
            "send_sms" => Ok(Step::SendSms(config("send_sms", &spec.config)?)),
            "wait" => Ok(Step::Wait(config("wait", &spec.config)?)),
            "condition" => Ok(Step::Condition(config("condition", &spec.config)?)),
            "call_ai" => Ok(Step::CallAi(config("call_ai", &spec.config)?)),
            "update_crm" => Ok(Step::UpdateCrm(config("update_crm", &spec.config)?)),
            "webhook" => Ok(Step::Webhook(config("webhook", &spec.config)?)),
            other => Ok(Step::Unknown {
                kind: other.to_string(),
            }),
        }
    }

    /// Step kind as stored on the wire.
    pub fn kind(&self) -> &str {
        match self {
            Step::SendEmail(_) => "send_email",
            Step::SendSms(_) => "send_sms",
            Step::Wait(_) => "wait",
            Step::Condition(_) => "condition",
            Step::CallAi(_) => "call_ai",
            Step::UpdateCrm(_) => "update_crm",
            Step::Webhook(_) => "webhook",
            Step::Unknown { kind } => kind,
        }
    }
}

/// Named message template, tenant-scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub name: String,
    pub subject: String,
    pub body: String,
}

/// Immutable-at-runtime description of an automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub trigger: TriggerPredicate,
    pub steps: Vec<StepSpec>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create an active definition with fresh timestamps.
    pub fn new(
        tenant_id: Uuid,
        name: impl Into<String>,
        trigger: TriggerPredicate,
        steps: Vec<StepSpec>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            trigger,
            steps,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Spec at the given index, if within bounds.
    pub fn step_spec(&self, index: usize) -> Option<&StepSpec> {
        self.steps.get(index)
    }
}
