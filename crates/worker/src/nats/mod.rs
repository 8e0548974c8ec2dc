//! NATS JetStream job bus.
//!
//! The engine publishes lightweight step jobs; workers consume them with a
//! durable pull consumer. Delayed dispatch is cooperative: a job due in the
//! future is negatively acknowledged with the remaining delay, so the
//! stream redelivers it at (or after) its wake time.

mod publisher;
mod subscriber;

pub use publisher::{NatsError, NatsJobQueue};
pub use subscriber::JobSubscriber;

/// Default NATS subject for step jobs.
pub const DEFAULT_SUBJECT: &str = "cadence.jobs";

/// Default JetStream stream name.
pub const DEFAULT_STREAM: &str = "cadence_jobs";
