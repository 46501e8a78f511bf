//! The storage contract.
//!
//! Each method is one atomic unit of work: the implementation either commits
//! every write the method performs or none of them. Business failures
//! detected inside the unit (insufficient stock, invalid transition, already
//! paid) roll the unit back and surface as `StoreError::Domain`.

use async_trait::async_trait;

use sokoni_core::{OrderId, ProductId, TransactionId, UserId};
use sokoni_inventory::StockLevel;
use sokoni_ledger::{FinancialSummary, TransactionDraft, TransactionRecord};
use sokoni_orders::{DeliveryStatus, DeliveryUpdate, Order, OrderDraft, PaymentDetails};

use super::error::StoreError;
use super::query::{OrderFilter, Page, Pagination, SummaryFilter, TransactionFilter};

/// Result of a committed delivery-status change, carrying the status the
/// order held before; the status-update notification needs both ends.
#[derive(Debug, Clone)]
pub struct DeliveryChange {
    pub previous: DeliveryStatus,
    pub order: Order,
}

/// Result of a committed payment recording.
#[derive(Debug, Clone)]
pub struct PaymentRecorded {
    pub order: Order,
    pub entry: TransactionRecord,
}

#[async_trait]
pub trait EngineStore: Send + Sync {
    // --- catalog collaborator surface ---

    /// Create or replace a product record.
    async fn put_product(&self, product: StockLevel) -> Result<(), StoreError>;

    /// Current stock levels for the given products. Unknown ids are simply
    /// absent from the result; callers aggregate the missing set.
    async fn stock_levels(&self, ids: &[ProductId]) -> Result<Vec<StockLevel>, StoreError>;

    // --- orders ---

    /// Create an order: allocate the next number in the draft's scope,
    /// conditionally decrement stock for every line, and insert the row.
    /// Stock checks inside this unit are authoritative; any failure rolls
    /// back the allocation and every decrement.
    async fn create_order(&self, draft: OrderDraft) -> Result<Order, StoreError>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn order_by_number(&self, number: &str) -> Result<Option<Order>, StoreError>;

    async fn orders(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<Page<Order>, StoreError>;

    /// Apply a delivery-status change under the transition table, updating
    /// tracking fields and the status history in the same unit.
    async fn apply_delivery_update(
        &self,
        id: OrderId,
        update: DeliveryUpdate,
    ) -> Result<DeliveryChange, StoreError>;

    async fn append_delivery_notes(&self, id: OrderId, notes: &str)
        -> Result<Order, StoreError>;

    /// Mark an order paid and insert the corresponding sale ledger entry in
    /// the same unit. The already-paid guard runs inside the unit, so two
    /// concurrent recordings cannot both pass it.
    async fn record_payment(
        &self,
        id: OrderId,
        payment: PaymentDetails,
        recorded_by: UserId,
    ) -> Result<PaymentRecorded, StoreError>;

    /// Persist the async-dispatch message id, only if none is set yet.
    /// Returns whether the write happened.
    async fn set_email_message_id(
        &self,
        id: OrderId,
        message_id: &str,
    ) -> Result<bool, StoreError>;

    // --- ledger ---

    /// Allocate a transaction number in the draft's scope and insert the
    /// record.
    async fn insert_transaction(
        &self,
        draft: TransactionDraft,
    ) -> Result<TransactionRecord, StoreError>;

    async fn transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    async fn transactions(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> Result<Page<TransactionRecord>, StoreError>;

    /// Administrative correction path; ledger entries are otherwise
    /// immutable. Returns whether a row was deleted.
    async fn delete_transaction(&self, id: TransactionId) -> Result<bool, StoreError>;

    /// Computed on read; no materialized aggregate exists.
    async fn financial_summary(
        &self,
        filter: &SummaryFilter,
    ) -> Result<FinancialSummary, StoreError>;
}
