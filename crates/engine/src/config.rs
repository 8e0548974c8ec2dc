//! Engine configuration.

use serde::Deserialize;
use std::time::Duration;

use crate::error::EngineResult;

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `CADENCE_`:
/// - `CADENCE_MAX_ATTEMPTS`: job retry ceiling for transient failures (default: 5)
/// - `CADENCE_RETRY_INITIAL_DELAY_MS`: first backoff delay (default: 500)
/// - `CADENCE_RETRY_MAX_DELAY_MS`: backoff cap (default: 60000)
/// - `CADENCE_RETRY_BACKOFF_MULTIPLIER`: exponential factor (default: 2.0)
/// - `CADENCE_AI_QUOTA_PER_MINUTE`: AI provider request budget (default: 60)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum delivery attempts for a job before the execution is failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,

    /// AI provider requests allowed per minute, per process.
    #[serde(default = "default_ai_quota")]
    pub ai_quota_per_minute: u32,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_ai_quota() -> u32 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_initial_delay_ms: default_initial_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_backoff_multiplier: default_backoff_multiplier(),
            ai_quota_per_minute: default_ai_quota(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `CADENCE_`-prefixed environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Ok(envy::prefixed("CADENCE_").from_env::<EngineConfig>()?)
    }

    /// Backoff delay before redelivering attempt `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = self.retry_backoff_multiplier.powi(exponent as i32);
        let delay_ms = (self.retry_initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(delay_ms.min(self.retry_max_delay_ms))
    }
}
