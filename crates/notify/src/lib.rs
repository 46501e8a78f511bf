//! `sokoni-notify` — the email collaborator.
//!
//! The engine never blocks on email: messages are handed to a worker after
//! the owning database transaction commits, and delivery failures are
//! logged, not surfaced. This crate holds the `Mailer` seam, the HTTP
//! mail-service client, and the message builders.

pub mod email;
pub mod http;
pub mod mailer;

pub use email::{order_confirmation, payment_receipt, status_update, EmailMessage};
pub use http::{HttpMailer, MailerConfig};
pub use mailer::{MailError, Mailer, MessageId, NoopMailer, RecordingMailer};
