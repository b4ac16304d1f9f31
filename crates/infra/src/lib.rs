//! Infrastructure layer: SQLite storage, configuration and the store
//! retirement workflow built on top of the pure inventory rules.

pub mod config;
pub mod consolidation;
pub mod db;
pub mod retirement;
pub mod stock_store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, DatabaseConfig, MergeStrategy, MissingStorePolicy, RetirementConfig};
pub use consolidation::{ConsolidationSummary, ProductMerge, StockConsolidator};
pub use retirement::{FailureKind, RetireError, RetirementReport, StoreRetirement};
pub use stock_store::{SqliteStockStore, StockStore, StockStoreError};
