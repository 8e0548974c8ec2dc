//! Execution records: one durable, resumable instance of a workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an execution.
///
/// `Paused` is manually set and only blocks step processing; it is never
/// reached automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl From<&str> for ExecutionStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Active,
        }
    }
}

/// One running or finished instance of a workflow definition.
///
/// `context` is an append-only JSON document serving both as working memory
/// (condition results, AI responses) and as the audit trail. The record is
/// mutated exclusively by the step processor, one step at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<Uuid>,

    /// Index of the next step to run. Only ever increases, except for
    /// explicit condition-step jumps; reaching `steps.len()` means done.
    pub current_step_index: usize,

    pub status: ExecutionStatus,

    /// Append-only context log.
    pub context: serde_json::Value,

    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Create a fresh active execution.
    pub fn new(tenant_id: Uuid, workflow_id: Uuid, subject_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            workflow_id,
            subject_id,
            current_step_index: 0,
            status: ExecutionStatus::Active,
            context: serde_json::json!({}),
            started_at: Utc::now(),
            last_executed_at: None,
            completed_at: None,
        }
    }

    /// Set a top-level context key.
    pub fn set_context(&mut self, key: &str, value: serde_json::Value) {
        if let Some(map) = self.context.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }

    /// Append an entry to a context array, creating the array on first use.
    pub fn append_context(&mut self, key: &str, entry: serde_json::Value) {
        let map = match self.context.as_object_mut() {
            Some(map) => map,
            None => {
                self.context = serde_json::json!({});
                self.context.as_object_mut().expect("fresh object")
            }
        };

        match map.get_mut(key) {
            Some(serde_json::Value::Array(items)) => items.push(entry),
            _ => {
                map.insert(key.to_string(), serde_json::Value::Array(vec![entry]));
            }
        }
    }

    /// Read a top-level context key.
    pub fn context_get(&self, key: &str) -> Option<&serde_json::Value> {
        self.context.get(key)
    }

    /// Recorded wake time for a duration-based wait at `step_index`, if any.
    pub fn wait_until(&self, step_index: usize) -> Option<DateTime<Utc>> {
        self.context
            .get("waits")?
            .get(step_index.to_string())?
            .as_str()?
            .parse::<DateTime<Utc>>()
            .ok()
    }

    /// Record the wake time for a duration-based wait, so redelivery of the
    /// same step cannot re-arm the timer.
    pub fn set_wait_until(&mut self, step_index: usize, until: DateTime<Utc>) {
        let map = self.context.as_object_mut().expect("context is an object");
        let waits = map
            .entry("waits".to_string())
            .or_insert_with(|| serde_json::json!({}));
        if let Some(waits) = waits.as_object_mut() {
            waits.insert(
                step_index.to_string(),
                serde_json::Value::String(until.to_rfc3339()),
            );
        }
    }

    /// Transition to `Failed`, recording the failure for inspection.
    pub fn record_failure(&mut self, step_index: usize, message: &str) {
        let now = Utc::now();
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(now);
        self.set_context(
            "error",
            serde_json::json!({
                "message": message,
                "stepIndex": step_index,
                "failedAt": now.to_rfc3339(),
            }),
        );
    }
}
