//! Execution runtime.
//!
//! The request/response surface of the engine: ingest events, start and
//! control executions, and process exactly one step per queued job. Each
//! unit of work loads the execution fresh from durable storage, runs the
//! step at its current index, writes the record back, and hands the
//! continuation decision to the job queue. No state survives in memory
//! between steps.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::interpreter::{Collaborators, NextAction, StepInterpreter};
use crate::engine::scheduler::Continuation;
use crate::engine::trigger::{TriggerEvent, TriggerMatcher};
use crate::error::{EngineError, EngineResult};
use crate::model::{ExecutionRecord, ExecutionStatus, Step};
use crate::queue::{JobQueue, StepJob};
use crate::store::{ExecutionStore, SubjectStore, WorkflowStore};

/// Result of one "process step" unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The execution is not in a runnable state; nothing changed. Absorbs
    /// duplicate delivery and answers pause/cancellation.
    NotRunnable { status: ExecutionStatus },
    /// The step index reached the end of the workflow; now completed.
    Completed,
    /// A terminal failure was recorded; no further steps will run.
    Failed { message: String },
    /// The step succeeded; the next step is at `next_index`.
    Continued { next_index: usize },
    /// A wait is pending; resume no earlier than `resume_at`.
    Scheduled { resume_at: chrono::DateTime<chrono::Utc> },
}

/// The engine's public runtime.
pub struct ExecutionRuntime {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    subjects: Arc<dyn SubjectStore>,
    queue: Arc<dyn JobQueue>,
    interpreter: StepInterpreter,
    matcher: TriggerMatcher,
}

impl ExecutionRuntime {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        subjects: Arc<dyn SubjectStore>,
        queue: Arc<dyn JobQueue>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            workflows,
            executions,
            subjects,
            queue,
            interpreter: StepInterpreter::new(collaborators),
            matcher: TriggerMatcher::new(),
        }
    }

    /// Ingest a system event: start one execution per matching active
    /// workflow of the event's tenant. Returns how many were triggered.
    pub async fn on_event(&self, event: TriggerEvent) -> EngineResult<usize> {
        let workflows = self.workflows.active_for_tenant(event.tenant_id).await?;
        let mut triggered = 0;

        for workflow in workflows {
            if !self.matcher.matches(&workflow, &event) {
                continue;
            }

            let mut execution =
                ExecutionRecord::new(event.tenant_id, workflow.id, event.subject_id());
            execution.set_context("eventType", serde_json::json!(event.event_type));
            execution.set_context("eventData", event.data.clone());
            execution.set_context("triggeredAt", serde_json::json!(Utc::now().to_rfc3339()));

            self.executions.create(&execution).await?;
            self.queue
                .enqueue(StepJob::immediate(event.tenant_id, execution.id))
                .await?;

            tracing::info!(
                tenant_id = %event.tenant_id,
                workflow_id = %workflow.id,
                execution_id = %execution.id,
                event_type = %event.event_type,
                "Workflow triggered"
            );
            triggered += 1;
        }

        Ok(triggered)
    }

    /// Manually start an execution of a workflow.
    pub async fn start_execution(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        subject_id: Option<Uuid>,
        context_seed: Option<serde_json::Value>,
    ) -> EngineResult<Uuid> {
        let workflow = self
            .workflows
            .get(tenant_id, workflow_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("workflow {}", workflow_id)))?;

        if !workflow.is_active {
            return Err(EngineError::Validation(format!(
                "workflow {} is inactive",
                workflow_id
            )));
        }

        let mut execution = ExecutionRecord::new(tenant_id, workflow_id, subject_id);
        if let Some(serde_json::Value::Object(seed)) = context_seed {
            for (key, value) in seed {
                execution.set_context(&key, value);
            }
        }

        self.executions.create(&execution).await?;
        self.queue
            .enqueue(StepJob::immediate(tenant_id, execution.id))
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            workflow_id = %workflow_id,
            execution_id = %execution.id,
            "Execution started manually"
        );
        Ok(execution.id)
    }

    /// Change an execution's status (pause, resume, external cancel).
    ///
    /// Terminal statuses are immutable; resuming a paused execution
    /// re-enqueues its next step.
    pub async fn set_status(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        status: ExecutionStatus,
    ) -> EngineResult<()> {
        let mut execution = self.load(tenant_id, execution_id).await?;

        if execution.status == status {
            return Ok(());
        }
        if matches!(
            execution.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed
        ) {
            return Err(EngineError::Validation(format!(
                "cannot change status of a {} execution",
                execution.status
            )));
        }

        let resuming =
            execution.status == ExecutionStatus::Paused && status == ExecutionStatus::Active;

        execution.status = status;
        if matches!(status, ExecutionStatus::Completed | ExecutionStatus::Failed) {
            execution.completed_at = Some(Utc::now());
        }
        self.executions.save(&execution).await?;

        if resuming {
            self.queue
                .enqueue(StepJob::immediate(tenant_id, execution_id))
                .await?;
        }

        tracing::info!(execution_id = %execution_id, status = %status, "Execution status changed");
        Ok(())
    }

    /// Terminally fail an execution. Used by the dispatch layer after
    /// exhausting retries for a transient failure. No-op on executions that
    /// already reached a terminal state.
    pub async fn fail_execution(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        message: &str,
    ) -> EngineResult<()> {
        let mut execution = self.load(tenant_id, execution_id).await?;

        if matches!(
            execution.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed
        ) {
            return Ok(());
        }

        execution.record_failure(execution.current_step_index, message);
        self.executions.save(&execution).await?;

        tracing::warn!(execution_id = %execution_id, message, "Execution failed");
        Ok(())
    }

    /// Process exactly one step for an execution.
    ///
    /// Safe under duplicate delivery: a non-active status or an
    /// out-of-bounds index resolves without re-running anything. Transient
    /// failures return `Err` WITHOUT mutating the record, so the job can be
    /// redelivered.
    pub async fn process_step(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> EngineResult<ProcessOutcome> {
        let mut execution = self.load(tenant_id, execution_id).await?;

        if execution.status != ExecutionStatus::Active {
            tracing::debug!(
                execution_id = %execution_id,
                status = %execution.status,
                "Cannot proceed: execution is not active"
            );
            return Ok(ProcessOutcome::NotRunnable {
                status: execution.status,
            });
        }

        let workflow = match self.workflows.get(tenant_id, execution.workflow_id).await? {
            Some(workflow) => workflow,
            None => {
                let message = format!("workflow {} no longer exists", execution.workflow_id);
                execution.record_failure(execution.current_step_index, &message);
                self.executions.save(&execution).await?;
                return Ok(ProcessOutcome::Failed { message });
            }
        };

        let index = execution.current_step_index;
        if index >= workflow.steps.len() {
            execution.status = ExecutionStatus::Completed;
            execution.completed_at = Some(Utc::now());
            self.executions.save(&execution).await?;
            tracing::info!(execution_id = %execution_id, "Execution completed");
            return Ok(ProcessOutcome::Completed);
        }

        // Config is read fresh each step; definition edits apply from the
        // next step onward.
        let spec = &workflow.steps[index];
        let step = match Step::parse(spec) {
            Ok(step) => step,
            Err(e) => {
                let message = e.to_string();
                execution.record_failure(index, &message);
                self.executions.save(&execution).await?;
                return Ok(ProcessOutcome::Failed { message });
            }
        };

        let mut subject = match execution.subject_id {
            Some(subject_id) => self.subjects.get(tenant_id, subject_id).await?,
            None => None,
        };

        tracing::debug!(
            execution_id = %execution_id,
            step_index = index,
            step_kind = %step.kind(),
            "Processing step"
        );

        match self
            .interpreter
            .run_step(&mut execution, subject.as_mut(), &step)
            .await
        {
            Ok(outcome) if outcome.success => {
                execution.last_executed_at = Some(Utc::now());
                match outcome.next_action {
                    NextAction::ResumeAt(resume_at) => {
                        // The wait is pending: hold the index; the handler
                        // re-checks on the next delivery.
                        self.executions.save(&execution).await?;
                        Ok(ProcessOutcome::Scheduled { resume_at })
                    }
                    _ => {
                        let next_index = outcome.next_index.unwrap_or(index + 1);
                        execution.current_step_index = next_index;
                        self.executions.save(&execution).await?;
                        Ok(ProcessOutcome::Continued { next_index })
                    }
                }
            }
            Ok(outcome) => {
                execution.record_failure(index, &outcome.message);
                self.executions.save(&execution).await?;
                tracing::warn!(
                    execution_id = %execution_id,
                    step_index = index,
                    message = %outcome.message,
                    "Step failed terminally"
                );
                Ok(ProcessOutcome::Failed {
                    message: outcome.message,
                })
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    execution_id = %execution_id,
                    step_index = index,
                    error = %e,
                    "Step failed transiently; leaving record untouched for retry"
                );
                Err(EngineError::TransientStep {
                    step_index: index,
                    message: e.to_string(),
                })
            }
            Err(e) => {
                let message = e.to_string();
                execution.record_failure(index, &message);
                self.executions.save(&execution).await?;
                tracing::warn!(
                    execution_id = %execution_id,
                    step_index = index,
                    message = %message,
                    "Step failed terminally"
                );
                Ok(ProcessOutcome::Failed { message })
            }
        }
    }

    /// Process one step, then apply the continuation decision to the queue.
    pub async fn process_and_continue(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
    ) -> EngineResult<ProcessOutcome> {
        let outcome = self.process_step(tenant_id, execution_id).await?;

        match Continuation::decide(&outcome) {
            Continuation::Done => {}
            Continuation::Enqueue { not_before } => {
                self.queue
                    .enqueue(StepJob {
                        tenant_id,
                        execution_id,
                        not_before,
                    })
                    .await?;
            }
        }

        Ok(outcome)
    }

    async fn load(&self, tenant_id: Uuid, execution_id: Uuid) -> EngineResult<ExecutionRecord> {
        self.executions
            .get(tenant_id, execution_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution {}", execution_id)))
    }
}
