//! `sokoni-store` — persistence for the order & ledger engine.
//!
//! Every [`EngineStore`] method is one atomic unit of work: it either
//! commits all of its writes or none of them. The Postgres implementation
//! runs each unit in one database transaction; the in-memory implementation
//! serializes units behind a single lock and is intended for tests and dev.

pub mod engine_store;

pub use engine_store::error::StoreError;
pub use engine_store::in_memory::InMemoryEngineStore;
pub use engine_store::postgres::{PostgresEngineStore, PostgresStoreConfig};
pub use engine_store::query::{OrderFilter, Page, Pagination, SummaryFilter, TransactionFilter};
pub use engine_store::r#trait::{DeliveryChange, EngineStore, PaymentRecorded};
