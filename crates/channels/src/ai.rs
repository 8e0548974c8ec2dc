//! Generative-AI provider channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ChannelError;
use crate::quota::QuotaLimiter;

/// Text generation against a hosted model.
///
/// `context` carries the execution's working memory so providers that accept
/// grounding data can use it; providers that don't may ignore it.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        context: &serde_json::Value,
    ) -> Result<String, ChannelError>;

    /// Provider label recorded into the execution context log.
    fn service_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    context: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// AI provider backed by a hosted HTTP generation API, bounded by a
/// sliding-window request quota.
pub struct HttpAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    quota: QuotaLimiter,
}

impl HttpAiProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        quota: QuotaLimiter,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            quota,
        }
    }
}

#[async_trait]
impl AiProvider for HttpAiProvider {
    async fn generate(
        &self,
        prompt: &str,
        context: &serde_json::Value,
    ) -> Result<String, ChannelError> {
        // Quota exhaustion surfaces as a retryable failure, not a step failure.
        self.quota.try_acquire()?;

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            context,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ChannelError::QuotaExceeded {
                limit: 0,
                window_secs: 0,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Http(format!(
                "AI provider returned {}: {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = response.json().await?;

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Generation completed");
        Ok(parsed.text)
    }

    fn service_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedProvider;

    #[async_trait]
    impl AiProvider for CannedProvider {
        async fn generate(
            &self,
            prompt: &str,
            _context: &serde_json::Value,
        ) -> Result<String, ChannelError> {
            Ok(format!("echo: {}", prompt))
        }

        fn service_name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn test_provider_trait_object() {
        let provider: Box<dyn AiProvider> = Box::new(CannedProvider);
        let text = provider
            .generate("hello", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(text, "echo: hello");
        assert_eq!(provider.service_name(), "canned");
    }

    #[test]
    fn test_generate_request_serialization() {
        let context = serde_json::json!({"tone": "friendly"});
        let request = GenerateRequest {
            model: "text-large",
            prompt: "Write a subject line",
            context: &context,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("text-large"));
        assert!(json.contains("subject line"));
    }
}
