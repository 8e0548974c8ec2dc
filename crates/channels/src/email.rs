//! Email delivery channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ChannelError;

/// A rendered, ready-to-send email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,

    /// Subject line.
    pub subject: String,

    /// Plain-text body.
    pub body: String,

    /// Optional sender override; the provider default applies otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// Fire-and-forget email delivery.
///
/// Implementations hand the message to a provider and return once it is
/// accepted; no delivery confirmation is awaited.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), ChannelError>;
}

/// Email transport backed by an HTTP delivery provider API.
pub struct HttpEmailTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpEmailTransport {
    /// Create a transport posting to the given provider endpoint.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Http(format!(
                "email provider returned {}: {}",
                status, body
            )));
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "Email accepted by provider");
        Ok(())
    }
}
