//! HTTP mail-service client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::email::EmailMessage;
use crate::mailer::{MailError, Mailer, MessageId};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the transactional-mail HTTP API.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Endpoint accepting `POST {from, to, subject, text}`.
    pub api_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Sender address.
    pub from_address: String,
    pub timeout: Duration,
}

impl MailerConfig {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            from_address: from_address.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Read configuration from `MAIL_API_URL`, `MAIL_API_KEY`, `MAIL_FROM`.
    pub fn from_env() -> Result<Self, MailError> {
        let api_url = std::env::var("MAIL_API_URL")
            .map_err(|_| MailError::Config("MAIL_API_URL is not set".to_string()))?;
        let api_key = std::env::var("MAIL_API_KEY")
            .map_err(|_| MailError::Config("MAIL_API_KEY is not set".to_string()))?;
        let from_address = std::env::var("MAIL_FROM")
            .unwrap_or_else(|_| "orders@sokoni.example".to_string());
        Ok(Self::new(api_url, api_key, from_address))
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Mailer backed by an HTTP transactional-mail API.
pub struct HttpMailer {
    config: MailerConfig,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(config: MailerConfig) -> Result<Self, MailError> {
        if config.api_url.is_empty() {
            return Err(MailError::Config("api_url is required".to_string()));
        }
        if config.api_key.is_empty() {
            return Err(MailError::Config("api_key is required".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MailError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailer_rejects_incomplete_configuration() {
        let missing_key = MailerConfig::new("https://mail.example/send", "", "orders@example.com");
        assert!(matches!(
            HttpMailer::new(missing_key),
            Err(MailError::Config(_))
        ));

        let missing_url = MailerConfig::new("", "key", "orders@example.com");
        assert!(matches!(
            HttpMailer::new(missing_url),
            Err(MailError::Config(_))
        ));
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<MessageId, MailError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "from": self.config.from_address,
                "to": message.to,
                "subject": message.subject,
                "text": message.body,
            }))
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| MailError::Transport(format!("invalid mail service response: {e}")))?;
        tracing::debug!(to = %message.to, message_id = %parsed.id, "email accepted by mail service");
        Ok(MessageId(parsed.id))
    }
}
