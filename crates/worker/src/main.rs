//! Cadence Worker binary.
//!
//! Consumes step jobs from NATS JetStream and drives workflow executions
//! against Postgres-backed state.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_channels::{
    HttpAiProvider, HttpEmailTransport, HttpSmsTransport, HttpWebhookSender, QuotaLimiter,
};
use cadence_engine::engine::interpreter::Collaborators;
use cadence_engine::store::postgres::{
    create_pool, PgExecutionStore, PgSubjectStore, PgTemplateStore, PgWorkflowStore,
};
use cadence_engine::{EngineConfig, ExecutionRuntime};
use cadence_worker::{Dispatcher, JobSubscriber, NatsJobQueue, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cadence_worker=debug,cadence_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    tracing::info!("Starting Cadence Worker");

    let config = WorkerConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;
    tracing::info!(
        worker_id = %config.worker_id,
        nats_url = %config.nats_url,
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Worker configuration loaded"
    );

    // Durable stores
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    let workflows = Arc::new(PgWorkflowStore::new(pool.clone()));
    let executions = Arc::new(PgExecutionStore::new(pool.clone()));
    let subjects = Arc::new(PgSubjectStore::new(pool.clone()));
    let templates = Arc::new(PgTemplateStore::new(pool));

    // Outbound channels
    let quota = QuotaLimiter::new(engine_config.ai_quota_per_minute, Duration::from_secs(60));
    let collaborators = Collaborators {
        email: Arc::new(HttpEmailTransport::new(
            config.email_api_url.as_str(),
            config.email_api_key.as_str(),
        )),
        sms: Arc::new(HttpSmsTransport::new(
            config.sms_api_url.as_str(),
            config.sms_api_key.as_str(),
        )),
        webhook: Arc::new(HttpWebhookSender::new()),
        ai: Arc::new(HttpAiProvider::new(
            config.ai_api_url.as_str(),
            config.ai_api_key.as_str(),
            config.ai_model.as_str(),
            quota,
        )),
        subjects: subjects.clone(),
        templates,
    };

    // Job bus
    let queue = Arc::new(
        NatsJobQueue::connect(&config.nats_url, Some(&config.nats_stream), None).await?,
    );
    let subscriber =
        JobSubscriber::connect(&config.nats_url, &config.nats_stream, &config.nats_consumer)
            .await?;

    let runtime = Arc::new(ExecutionRuntime::new(
        workflows,
        executions,
        subjects,
        queue,
        collaborators,
    ));

    let dispatcher = Dispatcher::new(
        runtime,
        subscriber,
        engine_config,
        config.max_concurrent_jobs,
    );

    // Handle shutdown signals
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
        tracing::info!("Shutdown signal received");
    };

    tokio::select! {
        result = dispatcher.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Dispatcher error");
                return Err(e);
            }
        }
        _ = shutdown => {
            tracing::info!("Shutting down worker");
        }
    }

    tracing::info!("Worker stopped");
    Ok(())
}
