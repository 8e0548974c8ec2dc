//! Event-to-workflow trigger matching.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::condition::{evaluate, lookup_path};
use crate::model::WorkflowDefinition;

/// An incoming system event (`onEvent` boundary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event type (e.g. "contact_created", "form_submitted").
    pub event_type: String,

    /// Event payload; trigger clauses address into it with dotted paths.
    #[serde(default)]
    pub data: serde_json::Value,

    pub tenant_id: Uuid,
}

impl TriggerEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value, tenant_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            tenant_id,
        }
    }

    /// Subject referenced by the payload, if any.
    pub fn subject_id(&self) -> Option<Uuid> {
        self.data
            .get("subjectId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Matches incoming events against workflow trigger predicates.
pub struct TriggerMatcher;

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Whether the event should start an execution of this workflow.
    ///
    /// Inactive definitions never match; clauses are AND-combined, and an
    /// empty clause list always matches.
    pub fn matches(&self, workflow: &WorkflowDefinition, event: &TriggerEvent) -> bool {
        if !workflow.is_active {
            return false;
        }
        if workflow.trigger.event_type != event.event_type {
            return false;
        }
        workflow.trigger.conditions.iter().all(|clause| {
            let actual = lookup_path(&event.data, &clause.field);
            evaluate(clause.operator, actual, &clause.value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConditionClause, Operator, TriggerPredicate};

    fn workflow(event_type: &str, conditions: Vec<ConditionClause>) -> WorkflowDefinition {
        WorkflowDefinition::new(
            Uuid::new_v4(),
            "test-workflow",
            TriggerPredicate {
                event_type: event_type.to_string(),
                conditions,
            },
            vec![],
        )
    }

    #[test]
    fn test_event_type_must_match() {
        let matcher = TriggerMatcher::new();
        let workflow = workflow("contact_created", vec![]);
        let tenant_id = workflow.tenant_id;

        assert!(matcher.matches(
            &workflow,
            &TriggerEvent::new("contact_created", serde_json::json!({}), tenant_id)
        ));
        assert!(!matcher.matches(
            &workflow,
            &TriggerEvent::new("contact_deleted", serde_json::json!({}), tenant_id)
        ));
    }

    #[test]
    fn test_clauses_are_and_combined() {
        let matcher = TriggerMatcher::new();
        let workflow = workflow(
            "form_submitted",
            vec![
                ConditionClause {
                    field: "form.name".to_string(),
                    operator: Operator::Equals,
                    value: serde_json::json!("demo-request"),
                },
                ConditionClause {
                    field: "score".to_string(),
                    operator: Operator::GreaterThan,
                    value: serde_json::json!(40),
                },
            ],
        );
        let tenant_id = workflow.tenant_id;

        let matching = TriggerEvent::new(
            "form_submitted",
            serde_json::json!({"form": {"name": "demo-request"}, "score": 75}),
            tenant_id,
        );
        assert!(matcher.matches(&workflow, &matching));

        let one_clause_fails = TriggerEvent::new(
            "form_submitted",
            serde_json::json!({"form": {"name": "demo-request"}, "score": 10}),
            tenant_id,
        );
        assert!(!matcher.matches(&workflow, &one_clause_fails));
    }

    #[test]
    fn test_inactive_workflow_never_matches() {
        let matcher = TriggerMatcher::new();
        let mut workflow = workflow("contact_created", vec![]);
        workflow.is_active = false;

        assert!(!matcher.matches(
            &workflow,
            &TriggerEvent::new("contact_created", serde_json::json!({}), workflow.tenant_id)
        ));
    }

    #[test]
    fn test_subject_id_extraction() {
        let subject_id = Uuid::new_v4();
        let event = TriggerEvent::new(
            "contact_created",
            serde_json::json!({"subjectId": subject_id.to_string()}),
            Uuid::new_v4(),
        );
        assert_eq!(event.subject_id(), Some(subject_id));

        let without = TriggerEvent::new("contact_created", serde_json::json!({}), Uuid::new_v4());
        assert_eq!(without.subject_id(), None);

        let malformed = TriggerEvent::new(
            "contact_created",
            serde_json::json!({"subjectId": "not-a-uuid"}),
            Uuid::new_v4(),
        );
        assert_eq!(malformed.subject_id(), None);
    }
}
