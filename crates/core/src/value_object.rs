//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two instances
/// with the same attribute values are interchangeable. Item snapshots and
/// status-history entries are the canonical examples here: once an order is
/// created they never change, regardless of later catalog edits.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
