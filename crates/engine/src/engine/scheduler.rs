//! Continuation scheduling.
//!
//! The decision that makes an execution durable and resumable without
//! holding any resource between steps: after a step resolves, either the
//! execution is done, or exactly one follow-up job is enqueued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime::ProcessOutcome;

/// What to do with the job bus after a step resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Continuation {
    /// Terminal or not-runnable: nothing further is scheduled.
    Done,
    /// Enqueue the next "process step" job, optionally not before an
    /// instant. Early delivery is tolerated; the wait handler re-checks.
    Enqueue {
        #[serde(skip_serializing_if = "Option::is_none")]
        not_before: Option<DateTime<Utc>>,
    },
}

impl Continuation {
    /// Pure decision over a step-processing outcome.
    pub fn decide(outcome: &ProcessOutcome) -> Self {
        match outcome {
            ProcessOutcome::NotRunnable { .. }
            | ProcessOutcome::Completed
            | ProcessOutcome::Failed { .. } => Continuation::Done,
            ProcessOutcome::Continued { .. } => Continuation::Enqueue { not_before: None },
            ProcessOutcome::Scheduled { resume_at } => Continuation::Enqueue {
                not_before: Some(*resume_at),
            },
        }
    }
}
