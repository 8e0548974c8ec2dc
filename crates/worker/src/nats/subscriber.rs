//! Step job subscriber.

use anyhow::Result;
use async_nats::jetstream::{self, consumer::pull::Config as ConsumerConfig, AckKind, Context};
use futures::StreamExt;
use std::time::Duration;

use cadence_engine::queue::StepJob;

use super::DEFAULT_SUBJECT;

/// NATS JetStream subscriber for step jobs.
pub struct JobSubscriber {
    js: Context,
    stream: String,
    consumer: String,
    subject: String,
}

impl JobSubscriber {
    /// Connect to NATS and create a subscriber.
    pub async fn connect(nats_url: &str, stream: &str, consumer: &str) -> Result<Self> {
        let client = async_nats::connect(nats_url).await?;
        let js = jetstream::new(client);

        // Ensure stream exists
        let stream_config = jetstream::stream::Config {
            name: stream.to_string(),
            subjects: vec![DEFAULT_SUBJECT.to_string()],
            ..Default::default()
        };

        match js.get_stream(stream).await {
            Ok(_) => {
                tracing::debug!(stream = %stream, "Using existing NATS stream");
            }
            Err(_) => {
                js.create_stream(stream_config).await?;
                tracing::info!(stream = %stream, "Created NATS stream");
            }
        }

        Ok(Self {
            js,
            stream: stream.to_string(),
            consumer: consumer.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
        })
    }

    /// Create or get the durable consumer.
    async fn ensure_consumer(
        &self,
    ) -> Result<jetstream::consumer::Consumer<jetstream::consumer::pull::Config>> {
        let stream = self.js.get_stream(&self.stream).await?;

        let consumer_config = ConsumerConfig {
            durable_name: Some(self.consumer.clone()),
            filter_subject: self.subject.clone(),
            ..Default::default()
        };

        match stream.get_consumer(&self.consumer).await {
            Ok(consumer) => Ok(consumer),
            Err(_) => {
                let consumer = stream.create_consumer(consumer_config).await?;
                tracing::info!(consumer = %self.consumer, "Created NATS consumer");
                Ok(consumer)
            }
        }
    }

    /// Receive the next step job, if one is available.
    pub async fn receive(&self) -> Result<Option<(StepJob, jetstream::Message)>> {
        let consumer = self.ensure_consumer().await?;

        let mut messages = consumer.fetch().max_messages(1).messages().await?;

        if let Some(msg) = messages.next().await {
            let msg = msg.map_err(|e| anyhow::anyhow!("Failed to receive message: {}", e))?;
            let job: StepJob = serde_json::from_slice(&msg.payload)?;
            return Ok(Some((job, msg)));
        }

        Ok(None)
    }

    /// Acknowledge a message as processed.
    pub async fn ack(msg: &jetstream::Message) -> Result<()> {
        msg.ack()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to ack message: {}", e))
    }

    /// Negatively acknowledge a message so it is redelivered after `delay`.
    pub async fn nak(msg: &jetstream::Message, delay: Duration) -> Result<()> {
        msg.ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to nak message: {}", e))
    }

    /// Delivery attempt count for a message (1-based).
    pub fn attempt(msg: &jetstream::Message) -> u32 {
        msg.info()
            .map(|info| info.delivered.max(1) as u32)
            .unwrap_or(1)
    }
}
