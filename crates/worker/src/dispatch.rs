//! Job dispatch loop.
//!
//! Pulls step jobs, runs them through the engine with bounded concurrency,
//! and applies the retry policy: transient failures are NAK'd with
//! exponential backoff until the attempt ceiling, then converted into a
//! terminal execution failure. Terminal errors never retry.

use anyhow::Result;
use async_nats::jetstream;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use cadence_engine::queue::StepJob;
use cadence_engine::{EngineConfig, ExecutionRuntime};

use crate::nats::JobSubscriber;

/// Pause between empty fetches.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Worker-side job dispatcher.
pub struct Dispatcher {
    runtime: Arc<ExecutionRuntime>,
    subscriber: JobSubscriber,
    config: EngineConfig,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        runtime: Arc<ExecutionRuntime>,
        subscriber: JobSubscriber,
        config: EngineConfig,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            runtime,
            subscriber,
            config,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
        }
    }

    /// Run the dispatch loop until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        loop {
            // Wait for a free slot before fetching, so we never hold
            // unprocessed messages while saturated.
            let permit = self.semaphore.clone().acquire_owned().await?;

            match self.subscriber.receive().await {
                Ok(Some((job, msg))) => {
                    tracing::debug!(
                        execution_id = %job.execution_id,
                        tenant_id = %job.tenant_id,
                        "Received step job"
                    );

                    let runtime = self.runtime.clone();
                    let config = self.config.clone();

                    tokio::spawn(async move {
                        // Keep permit until done
                        let _permit = permit;
                        handle_job(runtime, config, job, msg).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                }
                Err(e) => {
                    drop(permit);
                    tracing::warn!(error = %e, "Job fetch failed; backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// Process one job delivery end to end.
async fn handle_job(
    runtime: Arc<ExecutionRuntime>,
    config: EngineConfig,
    job: StepJob,
    msg: jetstream::Message,
) {
    // Not due yet: push it back with the remaining delay. The engine
    // tolerates early delivery, so an imprecise redelivery is harmless.
    if let Some(not_before) = job.not_before {
        let now = Utc::now();
        if not_before > now {
            let delay = (not_before - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(
                execution_id = %job.execution_id,
                delay_secs = delay.as_secs(),
                "Job not yet due; deferring"
            );
            if let Err(e) = JobSubscriber::nak(&msg, delay).await {
                tracing::warn!(error = %e, "Failed to defer job");
            }
            return;
        }
    }

    let attempt = JobSubscriber::attempt(&msg);

    match runtime
        .process_and_continue(job.tenant_id, job.execution_id)
        .await
    {
        Ok(outcome) => {
            tracing::debug!(
                execution_id = %job.execution_id,
                outcome = ?outcome,
                "Step processed"
            );
            if let Err(e) = JobSubscriber::ack(&msg).await {
                tracing::warn!(error = %e, "Failed to ack job");
            }
        }
        Err(e) if e.is_transient() => {
            if attempt >= config.max_attempts {
                tracing::warn!(
                    execution_id = %job.execution_id,
                    attempt,
                    error = %e,
                    "Retries exhausted; failing execution"
                );
                let message = format!("retries exhausted after {} attempts: {}", attempt, e);
                if let Err(fail_err) = runtime
                    .fail_execution(job.tenant_id, job.execution_id, &message)
                    .await
                {
                    tracing::error!(
                        execution_id = %job.execution_id,
                        error = %fail_err,
                        "Failed to record execution failure"
                    );
                }
                if let Err(ack_err) = JobSubscriber::ack(&msg).await {
                    tracing::warn!(error = %ack_err, "Failed to ack job");
                }
            } else {
                let delay = config.retry_delay(attempt);
                tracing::warn!(
                    execution_id = %job.execution_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure; retrying with backoff"
                );
                if let Err(nak_err) = JobSubscriber::nak(&msg, delay).await {
                    tracing::warn!(error = %nak_err, "Failed to nak job");
                }
            }
        }
        Err(e) => {
            // Nothing escapes the job boundary: a non-transient engine
            // error is converted into a terminal failure where possible
            // (the execution may simply no longer exist).
            tracing::error!(
                execution_id = %job.execution_id,
                error = %e,
                "Non-retryable error while processing job"
            );
            let _ = runtime
                .fail_execution(job.tenant_id, job.execution_id, &e.to_string())
                .await;
            if let Err(ack_err) = JobSubscriber::ack(&msg).await {
                tracing::warn!(error = %ack_err, "Failed to ack job");
            }
        }
    }
}
