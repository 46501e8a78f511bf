//! `sokoni-ledger` — append-only financial ledger entries.
//!
//! Ledger entries are created once by the payment recorder or directly by an
//! administrator and are immutable thereafter; the only mutation the engine
//! defines is administrative delete-by-id. No update operation exists.

pub mod summary;
pub mod transaction;

pub use summary::{summarize, FinancialSummary};
pub use transaction::{
    currency_for, transaction_scope, ExpenseDetails, ExpenseEntry, SaleDetails, SaleEntry,
    TransactionDetails, TransactionDraft, TransactionKind, TransactionRecord,
};
