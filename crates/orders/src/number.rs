//! Reference-number scopes and formatting.
//!
//! Order numbers look like `RW2501-0000001`: country, two-digit year, month,
//! then a zero-padded sequence allocated per `(country, year, month)` scope.
//! Ledger entries reuse the same shape behind a type prefix (`SAL-`, `EXP-`).

use chrono::{DateTime, Datelike, Utc};

use sokoni_core::Country;

/// Width of the numeric suffix.
pub const SEQUENCE_WIDTH: usize = 7;

/// Allocation scope for an order created in `country` at `at`,
/// e.g. `"RW2501-"`. The trailing dash is part of the scope so that scopes
/// are prefix-free across months (`RW2501-` never prefixes `RW25011`).
pub fn order_scope(country: &Country, at: DateTime<Utc>) -> String {
    format!(
        "{}{:02}{:02}-",
        country.as_str(),
        at.year() % 100,
        at.month()
    )
}

/// Render a full reference number from its scope and allocated sequence.
pub fn format_number(scope: &str, sequence: i64) -> String {
    format!("{scope}{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// Split a reference number into its scope (trailing dash included) and
/// numeric suffix. Returns `None` for anything that does not end in a
/// dash-separated numeric suffix of the expected width.
pub fn split_number(number: &str) -> Option<(&str, i64)> {
    let dash = number.rfind('-')?;
    let (scope, suffix) = number.split_at(dash + 1);
    if suffix.len() != SEQUENCE_WIDTH || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((scope, suffix.parse().ok()?))
}
