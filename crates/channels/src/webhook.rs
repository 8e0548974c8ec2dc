//! Outbound webhook channel.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ChannelError;

/// An outbound HTTP call described by workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRequest {
    /// Target URL.
    pub url: String,

    /// HTTP method (default: POST).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// JSON payload (for POST/PUT/PATCH).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Sends webhook calls on behalf of workflow steps.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn call(&self, request: &WebhookRequest) -> Result<u16, ChannelError>;
}

/// Webhook sender backed by a shared reqwest client.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// Create a sender with a custom client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn call(&self, request: &WebhookRequest) -> Result<u16, ChannelError> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| ChannelError::InvalidConfig(format!("bad method: {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(payload) = &request.payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        tracing::debug!(url = %request.url, status, "Webhook delivered");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_request_defaults() {
        let request: WebhookRequest =
            serde_json::from_value(serde_json::json!({"url": "https://example.com/hook"})).unwrap();

        assert_eq!(request.method, "POST");
        assert!(request.headers.is_empty());
        assert!(request.payload.is_none());
    }

    #[tokio::test]
    async fn test_bad_method_is_terminal() {
        let sender = HttpWebhookSender::new();
        let request = WebhookRequest {
            url: "https://example.com/hook".to_string(),
            method: "NOT A METHOD".to_string(),
            headers: HashMap::new(),
            payload: None,
        };

        let err = sender.call(&request).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidConfig(_)));
        assert!(!err.is_transient());
    }
}
