//! Payment recording.

use std::sync::Arc;

use tracing::info;

use sokoni_core::{EngineError, EngineResult, OrderId, UserId};
use sokoni_ledger::TransactionRecord;
use sokoni_orders::{Order, PaymentDetails};
use sokoni_store::EngineStore;

use crate::dispatch::{EmailDispatcher, EmailTask};

/// Marks orders paid and produces the matching sale ledger entry.
pub struct PaymentService<S> {
    store: Arc<S>,
    emails: Option<EmailDispatcher>,
}

impl<S: EngineStore> PaymentService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            emails: None,
        }
    }

    pub fn with_emails(mut self, emails: EmailDispatcher) -> Self {
        self.emails = Some(emails);
        self
    }

    /// Record a payment in one transaction: set the order paid (guarded
    /// against double recording inside the unit of work), allocate the
    /// `SAL-` transaction number, insert the immutable sale ledger entry.
    /// The receipt email goes out after the commit; its failure never rolls
    /// anything back.
    pub async fn mark_as_paid(
        &self,
        order_id: OrderId,
        payment: PaymentDetails,
        recorded_by: UserId,
    ) -> EngineResult<(Order, TransactionRecord)> {
        if payment.method.trim().is_empty() {
            return Err(EngineError::validation("payment method is required"));
        }

        let recorded = self
            .store
            .record_payment(order_id, payment, recorded_by)
            .await?;
        info!(
            order_number = %recorded.order.order_number,
            transaction_number = %recorded.entry.transaction_number,
            amount = %recorded.entry.amount,
            "payment recorded"
        );

        if let Some(emails) = &self.emails {
            emails.enqueue(EmailTask::PaymentReceipt {
                order: recorded.order.clone(),
                entry: recorded.entry.clone(),
            });
        }
        Ok((recorded.order, recorded.entry))
    }
}
