//! Cadence worker: consumes step jobs from NATS JetStream and drives the
//! engine, with bounded concurrency and task-level retry.

pub mod config;
pub mod dispatch;
pub mod nats;

pub use config::WorkerConfig;
pub use dispatch::Dispatcher;
pub use nats::{JobSubscriber, NatsJobQueue};
