//! Stock levels and the aggregate availability check.
//!
//! The check is deliberately **not** fail-fast: a caller submitting a cart
//! with three bad lines should learn about all three at once. The conditional
//! decrement performed by the store remains the authoritative reservation;
//! this check exists to reject hopeless requests early and to produce the
//! complete diagnostic when the decrement fails.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sokoni_core::{EngineError, EngineResult, ProductId, StockShortage};

/// The engine's view of one product in the catalog store: identity, pricing
/// snapshot inputs, and current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price excluding tax.
    pub unit_price: Decimal,
    /// Tax percentage applied to this product (e.g. `18` for 18%).
    pub tax_pct: Decimal,
    pub stock: i64,
    pub in_stock: bool,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Decimal,
        tax_pct: Decimal,
        stock: i64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price,
            tax_pct,
            stock,
            in_stock: stock > 0,
            updated_at,
        }
    }
}

/// One requested line of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Validate a reservation request against current stock.
///
/// Missing products take precedence: if any requested id is absent from
/// `levels`, the result is `ProductNotFound` listing **all** missing ids.
/// Otherwise, if any line requests more than is available, the result is
/// `InsufficientStock` listing **every** offending line with requested vs.
/// available quantities.
pub fn check_availability(levels: &[StockLevel], requests: &[StockRequest]) -> EngineResult<()> {
    let mut missing = Vec::new();
    let mut shortages = Vec::new();

    for request in requests {
        match levels.iter().find(|l| l.product_id == request.product_id) {
            None => missing.push(request.product_id),
            Some(level) if level.stock < request.quantity => shortages.push(StockShortage {
                product_id: request.product_id,
                requested: request.quantity,
                available: level.stock,
            }),
            Some(_) => {}
        }
    }

    if !missing.is_empty() {
        return Err(EngineError::ProductNotFound(missing));
    }
    if !shortages.is_empty() {
        return Err(EngineError::InsufficientStock(shortages));
    }
    Ok(())
}
