//! Engine error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ProductId;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// One offending line in an `InsufficientStock` failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    pub product_id: ProductId,
    pub requested: i64,
    pub available: i64,
}

/// Engine-level error.
///
/// Business and validation failures the engine reports to callers.
/// Infrastructure failures are folded into `Storage` at the service
/// boundary; they never carry driver detail outward.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested order or transaction does not exist.
    #[error("not found")]
    NotFound,

    /// Aggregate: every referenced product id that does not exist.
    #[error("unknown products: {}", join_ids(.0))]
    ProductNotFound(Vec<ProductId>),

    /// Aggregate: every line whose requested quantity exceeds available stock.
    #[error("insufficient stock: {}", join_shortages(.0))]
    InsufficientStock(Vec<StockShortage>),

    /// The requested delivery-status change is not in the transition table.
    #[error("cannot change delivery status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Idempotency guard on payment recording.
    #[error("order is already marked as paid")]
    AlreadyPaid,

    /// Deliberately generic: covers both unknown order numbers and identity
    /// mismatches so callers cannot probe which order numbers exist.
    #[error("order not found or contact details do not match")]
    TrackingDenied,

    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_shortages(lines: &[StockShortage]) -> String {
    lines
        .iter()
        .map(|s| format!("{} (requested {}, available {})", s.product_id, s.requested, s.available))
        .collect::<Vec<_>>()
        .join("; ")
}
