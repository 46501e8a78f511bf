//! `sokoni-inventory` — stock views and the reservation availability check.

pub mod stock;

pub use stock::{check_availability, StockLevel, StockRequest};
