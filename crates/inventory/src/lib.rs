//! Inventory domain module.
//!
//! This crate contains the business rules for folding one store's stock into
//! another and for the retirement lifecycle, implemented purely as
//! deterministic domain logic (no IO, no SQL, no storage).

pub mod retirement;
pub mod stock;

pub use retirement::{RetirementRequest, RetirementState};
pub use stock::{MergeAction, StockLevels, StockRecord, Units};
