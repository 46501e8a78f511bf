pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use error::StoreError;
pub use in_memory::InMemoryEngineStore;
pub use postgres::PostgresEngineStore;
pub use query::{OrderFilter, Page, Pagination, SummaryFilter, TransactionFilter};
pub use r#trait::{DeliveryChange, EngineStore, PaymentRecorded};
