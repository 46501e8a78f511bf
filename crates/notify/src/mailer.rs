//! The mailer seam.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::email::EmailMessage;

/// Provider-assigned message identifier, persisted on the order for
/// threading follow-up mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

impl core::fmt::Display for MessageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mailer configuration error: {0}")]
    Config(String),

    #[error("mail transport error: {0}")]
    Transport(String),

    #[error("mail service rejected the message (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Sends a single email and returns the provider message id.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<MessageId, MailError>;
}

/// Discards everything. Default wiring for environments without a mail
/// service configured.
#[derive(Debug, Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<MessageId, MailError> {
        Ok(MessageId("discarded".to_string()))
    }
}

/// Test double: records every message and hands out sequential ids.
/// Flip `fail` to simulate a broken mail service.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    next_id: AtomicU64,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<MessageId, MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("recording mailer set to fail".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageId(format!("msg-{id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "someone@example.com".to_string(),
            subject: "hello".to_string(),
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn recording_mailer_hands_out_sequential_ids() {
        let mailer = RecordingMailer::new();
        let first = mailer.send(&message()).await.unwrap();
        let second = mailer.send(&message()).await.unwrap();
        assert_eq!(first.0, "msg-1");
        assert_eq!(second.0, "msg-2");
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn failing_mailer_records_nothing() {
        let mailer = RecordingMailer::new();
        mailer.set_failing(true);
        assert!(mailer.send(&message()).await.is_err());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn noop_mailer_always_succeeds() {
        let id = NoopMailer.send(&message()).await.unwrap();
        assert_eq!(id.0, "discarded");
    }
}
