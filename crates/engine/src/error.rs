//! Error types for the Cadence engine.
//!
//! Every failure is classified as transient (retryable at the dispatch
//! layer) or terminal (fails the execution immediately). The classification
//! lives in the type; callers never infer it from message text.

use thiserror::Error;

use cadence_channels::ChannelError;

/// Failure raised by a single step handler.
#[derive(Debug, Error)]
pub enum StepError {
    /// Malformed or missing step configuration. Terminal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A domain precondition does not hold (e.g. no bound contact for a
    /// step that requires one). Terminal, never retried.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A collaborator failed in a way expected to clear on its own.
    /// Propagated to the dispatch layer for bounded retry with backoff.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl StepError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }
}

impl From<ChannelError> for StepError {
    fn from(e: ChannelError) -> Self {
        if e.is_transient() {
            StepError::Transient(e.to_string())
        } else {
            StepError::Config(e.to_string())
        }
    }
}

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Referenced entity does not exist (or is outside the tenant).
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Invalid request against current state.
    #[error("validation error: {0}")]
    Validation(String),

    /// Durable store failure. Transient.
    #[error("storage error: {0}")]
    Storage(String),

    /// Job bus failure. Transient.
    #[error("queue error: {0}")]
    Queue(String),

    /// Template rendering failure.
    #[error("template error: {0}")]
    Template(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A step failed transiently; the job should be redelivered.
    #[error("transient failure at step {step_index}: {message}")]
    TransientStep { step_index: usize, message: String },
}

impl EngineError {
    /// Whether the dispatch layer should retry the job that hit this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Storage(_) | EngineError::Queue(_) | EngineError::TransientStep { .. }
        )
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<envy::Error> for EngineError {
    fn from(e: envy::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_classification() {
        assert!(!StepError::Config("missing url".into()).is_transient());
        assert!(!StepError::Precondition("no contact bound".into()).is_transient());
        assert!(StepError::Transient("timeout".into()).is_transient());
    }

    #[test]
    fn test_channel_error_mapping() {
        let transient: StepError = ChannelError::Http("503".into()).into();
        assert!(transient.is_transient());

        let terminal: StepError = ChannelError::InvalidConfig("bad method".into()).into();
        assert!(!terminal.is_transient());
    }

    #[test]
    fn test_engine_error_classification() {
        assert!(EngineError::Storage("connection reset".into()).is_transient());
        assert!(EngineError::Queue("publish failed".into()).is_transient());
        assert!(EngineError::TransientStep {
            step_index: 2,
            message: "quota".into()
        }
        .is_transient());
        assert!(!EngineError::NotFound("execution".into()).is_transient());
        assert!(!EngineError::Validation("inactive workflow".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::NotFound("workflow 42".to_string());
        assert_eq!(err.to_string(), "resource not found: workflow 42");
    }
}
