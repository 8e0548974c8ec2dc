//! Job queue boundary.
//!
//! The engine never talks to a broker directly; it enqueues [`StepJob`]s
//! through this trait. The production adapter lives in the worker (NATS
//! JetStream); [`InProcessQueue`] backs tests and single-process setups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::EngineResult;

/// One "process one step" unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepJob {
    pub tenant_id: Uuid,
    pub execution_id: Uuid,

    /// Deliver no earlier than this instant. Early delivery is tolerated by
    /// the processor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
}

impl StepJob {
    pub fn immediate(tenant_id: Uuid, execution_id: Uuid) -> Self {
        Self {
            tenant_id,
            execution_id,
            not_before: None,
        }
    }

    pub fn delayed(tenant_id: Uuid, execution_id: Uuid, not_before: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            execution_id,
            not_before: Some(not_before),
        }
    }
}

/// At-least-once job submission with optional delayed dispatch.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: StepJob) -> EngineResult<()>;
}

/// In-process queue: jobs accumulate and are drained by the caller.
///
/// Tests drive executions deterministically by popping due jobs in a loop;
/// there is no background delivery.
#[derive(Default)]
pub struct InProcessQueue {
    jobs: Mutex<Vec<StepJob>>,
}

impl InProcessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the first job due at `now`, if any.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<StepJob> {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        let position = jobs
            .iter()
            .position(|job| job.not_before.map(|t| t <= now).unwrap_or(true))?;
        Some(jobs.remove(position))
    }

    /// Peek the earliest `not_before` among pending jobs.
    pub fn next_wake_time(&self) -> Option<DateTime<Utc>> {
        let jobs = self.jobs.lock().expect("queue lock poisoned");
        jobs.iter().filter_map(|job| job.not_before).min()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobQueue for InProcessQueue {
    async fn enqueue(&self, job: StepJob) -> EngineResult<()> {
        self.jobs.lock().expect("queue lock poisoned").push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_immediate_jobs_are_due_now() {
        let queue = InProcessQueue::new();
        queue
            .enqueue(StepJob::immediate(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(Utc::now()).is_some());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_delayed_jobs_wait_for_their_instant() {
        let queue = InProcessQueue::new();
        let now = Utc::now();
        let wake = now + chrono::Duration::hours(1);

        queue
            .enqueue(StepJob::delayed(Uuid::new_v4(), Uuid::new_v4(), wake))
            .await
            .unwrap();

        assert!(queue.pop_due(now).is_none());
        assert_eq!(queue.next_wake_time(), Some(wake));
        assert!(queue.pop_due(wake).is_some());
    }

    #[tokio::test]
    async fn test_step_job_serialization() {
        let job = StepJob::immediate(Uuid::new_v4(), Uuid::new_v4());
        let json = serde_json::to_string(&job).unwrap();
        assert!(!json.contains("not_before"));

        let job = StepJob::delayed(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("not_before"));
    }
}
