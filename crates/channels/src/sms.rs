//! SMS delivery channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ChannelError;

/// A rendered, ready-to-send SMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsMessage {
    /// Recipient phone number (E.164).
    pub to: String,

    /// Message body.
    pub body: String,
}

/// Fire-and-forget SMS delivery.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> Result<(), ChannelError>;
}

/// SMS transport backed by an HTTP delivery provider API.
pub struct HttpSmsTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSmsTransport {
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
impl SmsTransport for HttpSmsTransport {
    async fn send(&self, message: &SmsMessage) -> Result<(), ChannelError> {
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
                "sms provider returned {}: {}",
                status, body
            )));
        }

        tracing::debug!(to = %message.to, "SMS accepted by provider");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sms_message_serialization() {
        let message = SmsMessage {
            to: "+15550100".to_string(),
            body: "Your demo is tomorrow".to_string(),
        };

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("+15550100"));
    }
}
