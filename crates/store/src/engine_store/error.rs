//! Store error model.

use thiserror::Error;

use sokoni_core::EngineError;

/// Error raised by a storage unit of work.
///
/// `Domain` carries a business failure detected inside the transaction
/// (insufficient stock, invalid transition, already paid, ...) after the
/// transaction was rolled back. The remaining variants are infrastructure
/// failures; they never leak driver types to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] EngineError),

    #[error("database error in {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A unique-constraint conflict that survived the internal retries.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(domain) => domain,
            StoreError::Database { operation, message } => {
                EngineError::storage(format!("{operation}: {message}"))
            }
            StoreError::Serialization(message) => EngineError::storage(message),
            StoreError::Conflict(message) => EngineError::storage(message),
        }
    }
}
