//! Step job publisher.
//!
//! Implements the engine's `JobQueue` trait over JetStream so the runtime
//! can enqueue follow-up jobs without knowing about NATS.

use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use thiserror::Error;

use cadence_engine::error::{EngineError, EngineResult};
use cadence_engine::queue::{JobQueue, StepJob};

use super::{DEFAULT_STREAM, DEFAULT_SUBJECT};

/// Errors that can occur during NATS operations.
#[derive(Debug, Error)]
pub enum NatsError {
    #[error("NATS connection error: {0}")]
    Connection(String),

    #[error("JetStream error: {0}")]
    JetStream(String),

    #[error("Publish error: {0}")]
    Publish(String),
}

/// JetStream-backed job queue.
#[derive(Clone)]
pub struct NatsJobQueue {
    js: Context,
    subject: String,
}

impl NatsJobQueue {
    /// Connect to NATS and ensure the job stream exists.
    pub async fn connect(
        nats_url: &str,
        stream: Option<&str>,
        subject: Option<&str>,
    ) -> Result<Self, NatsError> {
        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| NatsError::Connection(e.to_string()))?;
        let js = jetstream::new(client);

        let subject = subject.unwrap_or(DEFAULT_SUBJECT).to_string();
        let stream = stream.unwrap_or(DEFAULT_STREAM);
        Self::ensure_stream(&js, stream, &subject).await?;

        Ok(Self { js, subject })
    }

    /// Get the stream or create it with our subject.
    async fn ensure_stream(js: &Context, stream: &str, subject: &str) -> Result<(), NatsError> {
        match js.get_stream(stream).await {
            Ok(_) => {
                tracing::debug!(stream = %stream, "Using existing NATS stream");
            }
            Err(_) => {
                let config = jetstream::stream::Config {
                    name: stream.to_string(),
                    subjects: vec![subject.to_string()],
                    ..Default::default()
                };
                js.create_stream(config)
                    .await
                    .map_err(|e| NatsError::JetStream(e.to_string()))?;
                tracing::info!(stream = %stream, "Created NATS stream");
            }
        }
        Ok(())
    }

    /// Publish one job and wait for the stream's acknowledgement.
    pub async fn publish(&self, job: &StepJob) -> Result<(), NatsError> {
        let payload = serde_json::to_vec(job).map_err(|e| NatsError::Publish(e.to_string()))?;

        let ack = self
            .js
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| NatsError::Publish(e.to_string()))?;
        ack.await.map_err(|e| NatsError::Publish(e.to_string()))?;

        tracing::debug!(
            execution_id = %job.execution_id,
            not_before = ?job.not_before,
            "Step job published"
        );
        Ok(())
    }
}

#[async_trait]
impl JobQueue for NatsJobQueue {
    async fn enqueue(&self, job: StepJob) -> EngineResult<()> {
        self.publish(&job)
            .await
            .map_err(|e| EngineError::Queue(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_job_payload_roundtrip() {
        let job = StepJob::delayed(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        let payload = serde_json::to_vec(&job).unwrap();
        let decoded: StepJob = serde_json::from_slice(&payload).unwrap();

        assert_eq!(decoded.execution_id, job.execution_id);
        assert_eq!(decoded.tenant_id, job.tenant_id);
        assert_eq!(
            decoded.not_before.map(|t| t.timestamp()),
            job.not_before.map(|t| t.timestamp())
        );
    }

    #[test]
    fn test_nats_error_display() {
        let err = NatsError::Publish("stream gone".to_string());
        assert_eq!(err.to_string(), "Publish error: stream gone");
    }
}
