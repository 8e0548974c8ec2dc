//! Channel delivery error types.

use thiserror::Error;

/// Errors that can occur while delivering through a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP transport error (connection refused, DNS, 5xx, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Provider quota exhausted for the current window.
    #[error("Quota exceeded: {limit} requests per {window_secs}s window")]
    QuotaExceeded { limit: u32, window_secs: u64 },

    /// The channel was asked to do something its configuration cannot express.
    #[error("Invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The provider answered with a payload we could not decode.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ChannelError {
    /// Whether the dispatch layer should retry the surrounding job.
    ///
    /// Network faults, timeouts, and quota exhaustion are expected to clear
    /// on their own; configuration and decoding errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChannelError::Http(_) | ChannelError::Timeout(_) | ChannelError::QuotaExceeded { .. }
        )
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChannelError::Timeout(30)
        } else {
            ChannelError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        ChannelError::MalformedResponse(e.to_string())
    }
}
