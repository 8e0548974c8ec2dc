//! Durable storage boundary.
//!
//! Every method takes the tenant id explicitly; there is no ambient tenant
//! context anywhere in the engine.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::model::{ExecutionRecord, MessageTemplate, Subject, WorkflowDefinition};

/// Workflow definition storage.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<WorkflowDefinition>>;

    /// All active definitions for a tenant (trigger matching input).
    async fn active_for_tenant(&self, tenant_id: Uuid) -> EngineResult<Vec<WorkflowDefinition>>;

    async fn put(&self, workflow: &WorkflowDefinition) -> EngineResult<()>;
}

/// Execution record storage.
///
/// Records are fetched fresh at the start of each unit of work and written
/// back at the end; nothing is cached between steps.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<ExecutionRecord>>;
    async fn create(&self, execution: &ExecutionRecord) -> EngineResult<()>;
    async fn save(&self, execution: &ExecutionRecord) -> EngineResult<()>;
}

/// Subject (contact) storage.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<Subject>>;
    async fn save(&self, subject: &Subject) -> EngineResult<()>;
}

/// Named message template lookup.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get(&self, tenant_id: Uuid, name: &str) -> EngineResult<Option<MessageTemplate>>;
}
