//! Worker configuration.

use anyhow::Result;

/// Worker process configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique worker identifier.
    pub worker_id: String,

    /// Postgres connection URL.
    pub database_url: String,

    /// Maximum database connections.
    pub db_max_connections: u32,

    /// NATS server URL.
    pub nats_url: String,

    /// NATS stream name.
    pub nats_stream: String,

    /// NATS durable consumer name.
    pub nats_consumer: String,

    /// Maximum concurrent step jobs.
    pub max_concurrent_jobs: usize,

    /// Email delivery provider endpoint.
    pub email_api_url: String,
    pub email_api_key: String,

    /// SMS delivery provider endpoint.
    pub sms_api_url: String,
    pub sms_api_key: String,

    /// AI generation provider endpoint.
    pub ai_api_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let worker_id = std::env::var("CADENCE_WORKER_ID").unwrap_or_else(|_| {
            let host = hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            format!("{}-{}", host, uuid::Uuid::new_v4())
        });

        let database_url = std::env::var("CADENCE_DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/cadence".to_string());

        let db_max_connections: u32 = std::env::var("CADENCE_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let nats_url = std::env::var("CADENCE_NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let nats_stream =
            std::env::var("CADENCE_NATS_STREAM").unwrap_or_else(|_| "cadence_jobs".to_string());

        let nats_consumer = std::env::var("CADENCE_NATS_CONSUMER")
            .unwrap_or_else(|_| "cadence-workers".to_string());

        let max_concurrent_jobs: usize = std::env::var("CADENCE_MAX_CONCURRENT_JOBS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);

        let email_api_url = std::env::var("CADENCE_EMAIL_API_URL")
            .unwrap_or_else(|_| "http://localhost:8090/v1/email".to_string());
        let email_api_key = std::env::var("CADENCE_EMAIL_API_KEY").unwrap_or_default();

        let sms_api_url = std::env::var("CADENCE_SMS_API_URL")
            .unwrap_or_else(|_| "http://localhost:8090/v1/sms".to_string());
        let sms_api_key = std::env::var("CADENCE_SMS_API_KEY").unwrap_or_default();

        let ai_api_url = std::env::var("CADENCE_AI_API_URL")
            .unwrap_or_else(|_| "http://localhost:8091/v1/generate".to_string());
        let ai_api_key = std::env::var("CADENCE_AI_API_KEY").unwrap_or_default();
        let ai_model =
            std::env::var("CADENCE_AI_MODEL").unwrap_or_else(|_| "text-standard".to_string());

        Ok(Self {
            worker_id,
            database_url,
            db_max_connections,
            nats_url,
            nats_stream,
            nats_consumer,
            max_concurrent_jobs,
            email_api_url,
            email_api_key,
            sms_api_url,
            sms_api_key,
            ai_api_url,
            ai_api_key,
            ai_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.nats_stream, "cadence_jobs");
        assert_eq!(config.max_concurrent_jobs, 4);
        assert!(!config.worker_id.is_empty());
    }
}
