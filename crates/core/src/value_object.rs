//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two
/// value objects with the same values are the same value. To "modify" one,
/// construct a new one.
///
/// Examples in this workspace: a stock snapshot, a per-variant adjustment
/// summary. Contrast with entities (orders, shipments), which keep their
/// identity across state changes.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
