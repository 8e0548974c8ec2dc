//! Core data model: workflow definitions, execution records, subjects.

pub mod execution;
pub mod subject;
pub mod workflow;

pub use execution::{ExecutionRecord, ExecutionStatus};
pub use subject::Subject;
pub use workflow::{
    CallAiConfig, ConditionClause, ConditionConfig, MessageTemplate, Operator, SendEmailConfig,
    SendSmsConfig, Step, StepSpec, TriggerPredicate, UpdateCrmConfig, WaitConfig, WebhookConfig,
    WorkflowDefinition,
};
