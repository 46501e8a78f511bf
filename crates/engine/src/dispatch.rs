//! Post-commit email dispatch.
//!
//! Notifications are handed to an in-process worker over a bounded channel
//! after the owning unit of work committed. The worker sends with
//! at-least-once semantics and idempotent handling on the write-back side
//! (the message id is persisted only if the order has none yet). Delivery
//! failures are logged, never surfaced, and never hold a database
//! transaction open.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use sokoni_ledger::TransactionRecord;
use sokoni_notify::{order_confirmation, payment_receipt, status_update, Mailer};
use sokoni_orders::{DeliveryStatus, Order};
use sokoni_store::EngineStore;

const QUEUE_CAPACITY: usize = 256;

/// One queued notification.
#[derive(Debug, Clone)]
pub enum EmailTask {
    OrderConfirmation {
        order: Order,
    },
    StatusUpdate {
        order: Order,
        previous: DeliveryStatus,
    },
    PaymentReceipt {
        order: Order,
        entry: TransactionRecord,
    },
}

/// Handle services use to enqueue mail. Dropping every handle lets the
/// worker drain the queue and exit.
#[derive(Debug, Clone)]
pub struct EmailDispatcher {
    sender: mpsc::Sender<EmailTask>,
}

impl EmailDispatcher {
    /// Best-effort enqueue. A full queue drops the message with a warning;
    /// notifications must never block or fail the calling operation.
    pub fn enqueue(&self, task: EmailTask) {
        if let Err(err) = self.sender.try_send(task) {
            warn!(error = %err, "email queue full, dropping notification");
        }
    }
}

/// Spawn the dispatch worker.
pub fn spawn_email_worker<S>(
    store: Arc<S>,
    mailer: Arc<dyn Mailer>,
) -> (EmailDispatcher, JoinHandle<()>)
where
    S: EngineStore + 'static,
{
    let (sender, mut receiver) = mpsc::channel(QUEUE_CAPACITY);
    let handle = tokio::spawn(async move {
        while let Some(task) = receiver.recv().await {
            handle_task(store.as_ref(), mailer.as_ref(), task).await;
        }
    });
    (EmailDispatcher { sender }, handle)
}

async fn handle_task<S: EngineStore>(store: &S, mailer: &dyn Mailer, task: EmailTask) {
    match task {
        EmailTask::OrderConfirmation { order } => {
            let Some(message) = order_confirmation(&order) else {
                return;
            };
            match mailer.send(&message).await {
                Ok(message_id) => {
                    if let Err(err) = store.set_email_message_id(order.id, &message_id.0).await {
                        warn!(
                            order_number = %order.order_number,
                            error = %err,
                            "failed to persist email message id"
                        );
                    }
                }
                Err(err) => warn!(
                    order_number = %order.order_number,
                    error = %err,
                    "order confirmation email failed"
                ),
            }
        }
        EmailTask::StatusUpdate { order, previous } => {
            let Some(message) = status_update(&order, previous) else {
                return;
            };
            if let Err(err) = mailer.send(&message).await {
                warn!(
                    order_number = %order.order_number,
                    error = %err,
                    "status update email failed"
                );
            }
        }
        EmailTask::PaymentReceipt { order, entry } => {
            let Some(message) = payment_receipt(&order, &entry) else {
                return;
            };
            if let Err(err) = mailer.send(&message).await {
                warn!(
                    order_number = %order.order_number,
                    error = %err,
                    "payment receipt email failed"
                );
            }
        }
    }
}
