//! Postgres store implementations.
//!
//! Runtime-checked sqlx queries against the `cadence` schema (see
//! `schema.sql` at the repository root). Workflow triggers/steps, execution
//! context, and subject attributes are JSONB documents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    ExecutionRecord, ExecutionStatus, MessageTemplate, StepSpec, Subject, TriggerPredicate,
    WorkflowDefinition,
};
use crate::store::{ExecutionStore, SubjectStore, TemplateStore, WorkflowStore};

/// Shared connection pool type.
pub type DbPool = sqlx::PgPool;

/// Create a connection pool for the given database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> EngineResult<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

type WorkflowRow = (
    Uuid,
    Uuid,
    String,
    serde_json::Value,
    serde_json::Value,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn workflow_from_row(row: WorkflowRow) -> EngineResult<WorkflowDefinition> {
    let (id, tenant_id, name, trigger, steps, is_active, created_at, updated_at) = row;
    let trigger: TriggerPredicate = serde_json::from_value(trigger)?;
    let steps: Vec<StepSpec> = serde_json::from_value(steps)?;
    Ok(WorkflowDefinition {
        id,
        tenant_id,
        name,
        trigger,
        steps,
        is_active,
        created_at,
        updated_at,
    })
}

/// Workflow definitions in `cadence.workflow`.
#[derive(Clone)]
pub struct PgWorkflowStore {
    pool: DbPool,
}

impl PgWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<WorkflowDefinition>> {
        let row: Option<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, trigger, steps, is_active, created_at, updated_at
            FROM cadence.workflow
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(workflow_from_row).transpose()
    }

    async fn active_for_tenant(&self, tenant_id: Uuid) -> EngineResult<Vec<WorkflowDefinition>> {
        let rows: Vec<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, trigger, steps, is_active, created_at, updated_at
            FROM cadence.workflow
            WHERE tenant_id = $1 AND is_active = TRUE
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(workflow_from_row).collect()
    }

    async fn put(&self, workflow: &WorkflowDefinition) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cadence.workflow (
                id, tenant_id, name, trigger, steps, is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                trigger = EXCLUDED.trigger,
                steps = EXCLUDED.steps,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(workflow.id)
        .bind(workflow.tenant_id)
        .bind(&workflow.name)
        .bind(serde_json::to_value(&workflow.trigger)?)
        .bind(serde_json::to_value(&workflow.steps)?)
        .bind(workflow.is_active)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

type ExecutionRow = (
    Uuid,
    Uuid,
    Uuid,
    Option<Uuid>,
    i32,
    String,
    serde_json::Value,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

fn execution_from_row(row: ExecutionRow) -> ExecutionRecord {
    let (
        id,
        tenant_id,
        workflow_id,
        subject_id,
        current_step_index,
        status,
        context,
        started_at,
        last_executed_at,
        completed_at,
    ) = row;

    ExecutionRecord {
        id,
        tenant_id,
        workflow_id,
        subject_id,
        current_step_index: current_step_index.max(0) as usize,
        status: ExecutionStatus::from(status.as_str()),
        context,
        started_at,
        last_executed_at,
        completed_at,
    }
}

/// Execution records in `cadence.execution`.
#[derive(Clone)]
pub struct PgExecutionStore {
    pool: DbPool,
}

impl PgExecutionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<ExecutionRecord>> {
        let row: Option<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, workflow_id, subject_id, current_step_index,
                   status, context, started_at, last_executed_at, completed_at
            FROM cadence.execution
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(execution_from_row))
    }

    async fn create(&self, execution: &ExecutionRecord) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cadence.execution (
                id, tenant_id, workflow_id, subject_id, current_step_index,
                status, context, started_at, last_executed_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(execution.id)
        .bind(execution.tenant_id)
        .bind(execution.workflow_id)
        .bind(execution.subject_id)
        .bind(execution.current_step_index as i32)
        .bind(execution.status.to_string())
        .bind(&execution.context)
        .bind(execution.started_at)
        .bind(execution.last_executed_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, execution: &ExecutionRecord) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE cadence.execution SET
                current_step_index = $3,
                status = $4,
                context = $5,
                last_executed_at = $6,
                completed_at = $7
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(execution.tenant_id)
        .bind(execution.id)
        .bind(execution.current_step_index as i32)
        .bind(execution.status.to_string())
        .bind(&execution.context)
        .bind(execution.last_executed_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "execution {}",
                execution.id
            )));
        }
        Ok(())
    }
}

type SubjectRow = (
    Uuid,
    Uuid,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    serde_json::Value,
    DateTime<Utc>,
);

/// Subjects in `cadence.subject`.
#[derive(Clone)]
pub struct PgSubjectStore {
    pool: DbPool,
}

impl PgSubjectStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubjectStore for PgSubjectStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<Subject>> {
        let row: Option<SubjectRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, email, phone, first_name, last_name, attributes, updated_at
            FROM cadence.subject
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, tenant_id, email, phone, first_name, last_name, attributes, updated_at)| {
                Subject {
                    id,
                    tenant_id,
                    email,
                    phone,
                    first_name,
                    last_name,
                    attributes: attributes
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                    updated_at,
                }
            },
        ))
    }

    async fn save(&self, subject: &Subject) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cadence.subject (
                id, tenant_id, email, phone, first_name, last_name, attributes, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                attributes = EXCLUDED.attributes,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(subject.id)
        .bind(subject.tenant_id)
        .bind(&subject.email)
        .bind(&subject.phone)
        .bind(&subject.first_name)
        .bind(&subject.last_name)
        .bind(serde_json::Value::Object(subject.attributes.clone()))
        .bind(subject.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Message templates in `cadence.message_template`.
#[derive(Clone)]
pub struct PgTemplateStore {
    pool: DbPool,
}

impl PgTemplateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn get(&self, tenant_id: Uuid, name: &str) -> EngineResult<Option<MessageTemplate>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT name, subject, body
            FROM cadence.message_template
            WHERE tenant_id = $1 AND name = $2
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(name, subject, body)| MessageTemplate {
            name,
            subject,
            body,
        }))
    }
}
