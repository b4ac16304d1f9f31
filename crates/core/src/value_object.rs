//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two quantities of `5` units are the same
/// value no matter which store row they came from. They are immutable; "changing"
/// one means producing a new value (see `Units::checked_add` in the inventory crate).
///
/// - **Value Object**: `Units(5)` equals any other `Units(5)`
/// - **Entity**: a stock record is identified by its `(product, store)` key
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
