//! Direct ledger entries and the financial summary.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use sokoni_core::{EngineError, EngineResult, TransactionId, UserId};
use sokoni_ledger::{ExpenseEntry, FinancialSummary, SaleEntry, TransactionDraft, TransactionRecord};
use sokoni_store::{EngineStore, Page, Pagination, SummaryFilter, TransactionFilter};

/// Records sales and expenses not tied to an order, and aggregates.
pub struct LedgerService<S> {
    store: Arc<S>,
}

impl<S: EngineStore> LedgerService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn create_sale(
        &self,
        entry: SaleEntry,
        recorded_by: UserId,
    ) -> EngineResult<TransactionRecord> {
        let draft = TransactionDraft::sale(entry, recorded_by, Utc::now())?;
        let record = self.store.insert_transaction(draft).await?;
        info!(transaction_number = %record.transaction_number, amount = %record.amount, "sale recorded");
        Ok(record)
    }

    pub async fn create_expense(
        &self,
        entry: ExpenseEntry,
        recorded_by: UserId,
    ) -> EngineResult<TransactionRecord> {
        let draft = TransactionDraft::expense(entry, recorded_by, Utc::now())?;
        let record = self.store.insert_transaction(draft).await?;
        info!(transaction_number = %record.transaction_number, amount = %record.amount, "expense recorded");
        Ok(record)
    }

    pub async fn transaction(&self, id: TransactionId) -> EngineResult<TransactionRecord> {
        self.store
            .transaction(id)
            .await?
            .ok_or(EngineError::NotFound)
    }

    pub async fn list(
        &self,
        filter: TransactionFilter,
        pagination: Pagination,
    ) -> EngineResult<Page<TransactionRecord>> {
        Ok(self.store.transactions(&filter, pagination).await?)
    }

    /// Administrative correction: ledger entries are never edited in place,
    /// only deleted by id.
    pub async fn delete(&self, id: TransactionId) -> EngineResult<()> {
        if self.store.delete_transaction(id).await? {
            info!(transaction_id = %id, "ledger entry deleted");
            Ok(())
        } else {
            Err(EngineError::NotFound)
        }
    }

    pub async fn summary(&self, filter: SummaryFilter) -> EngineResult<FinancialSummary> {
        Ok(self.store.financial_summary(&filter).await?)
    }
}
