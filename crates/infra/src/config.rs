//! Configuration loading and representation.
//!
//! Values come from the process environment in production
//! (`RetirementConfig::from_env`, `DatabaseConfig::from_env`); tests feed the
//! same parsing through `from_lookup` with a plain closure.

use std::time::Duration;

use stockfold_core::StoreId;
use thiserror::Error;

pub const CENTRAL_STORE_ID_VAR: &str = "CENTRAL_STORE_ID";
pub const MERGE_STRATEGY_VAR: &str = "STOCKFOLD_MERGE_STRATEGY";
pub const MISSING_STORE_VAR: &str = "STOCKFOLD_MISSING_STORE";
pub const PURGE_SOURCE_STOCK_VAR: &str = "STOCKFOLD_PURGE_SOURCE_STOCK";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS_VAR: &str = "DATABASE_MAX_CONNECTIONS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// How a source record is folded into the central store.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum MergeStrategy {
    /// One `INSERT ... ON CONFLICT DO UPDATE` per product. No window between
    /// checking for the target row and writing it.
    #[default]
    Upsert,
    /// Existence check, then increment or insert. Kept for schemas that lack
    /// a usable uniqueness constraint for the upsert to target.
    CheckThenAct,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Upsert => "upsert",
            MergeStrategy::CheckThenAct => "check-then-act",
        }
    }
}

impl core::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MergeStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upsert" => Ok(MergeStrategy::Upsert),
            "check-then-act" | "check_then_act" => Ok(MergeStrategy::CheckThenAct),
            _ => Err(ConfigError::invalid(
                MERGE_STRATEGY_VAR,
                s,
                "expected `upsert` or `check-then-act`",
            )),
        }
    }
}

/// What to do when the store being retired has no row in `stores`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum MissingStorePolicy {
    /// Commit anyway; the report shows `store_deleted == false`.
    #[default]
    Succeed,
    /// Roll back with `RetireError::StoreNotFound`.
    Reject,
}

impl core::str::FromStr for MissingStorePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "succeed" => Ok(MissingStorePolicy::Succeed),
            "reject" => Ok(MissingStorePolicy::Reject),
            _ => Err(ConfigError::invalid(
                MISSING_STORE_VAR,
                s,
                "expected `succeed` or `reject`",
            )),
        }
    }
}

/// Store retirement configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetirementConfig {
    /// Store that absorbs the stock of every retired store.
    pub central_store_id: StoreId,
    pub merge_strategy: MergeStrategy,
    pub missing_store: MissingStorePolicy,
    /// Delete the retired store's own stock rows in the same transaction.
    pub purge_source_stock: bool,
}

impl RetirementConfig {
    pub fn new(central_store_id: StoreId) -> Self {
        Self {
            central_store_id,
            merge_strategy: MergeStrategy::default(),
            missing_store: MissingStorePolicy::default(),
            purge_source_stock: false,
        }
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn with_missing_store(mut self, policy: MissingStorePolicy) -> Self {
        self.missing_store = policy;
        self
    }

    pub fn with_purge_source_stock(mut self, purge: bool) -> Self {
        self.purge_source_stock = purge;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup(CENTRAL_STORE_ID_VAR).ok_or(ConfigError::Missing(CENTRAL_STORE_ID_VAR))?;
        let central_store_id = raw
            .parse::<StoreId>()
            .map_err(|e| ConfigError::invalid(CENTRAL_STORE_ID_VAR, &raw, e.to_string()))?;

        let mut config = Self::new(central_store_id);
        if let Some(raw) = lookup(MERGE_STRATEGY_VAR) {
            config.merge_strategy = raw.parse()?;
        }
        if let Some(raw) = lookup(MISSING_STORE_VAR) {
            config.missing_store = raw.parse()?;
        }
        if let Some(raw) = lookup(PURGE_SOURCE_STOCK_VAR) {
            config.purge_source_stock = parse_bool(PURGE_SOURCE_STOCK_VAR, &raw)?;
        }
        Ok(config)
    }
}

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            // SQLite permits a single writer; one connection also keeps an
            // in-memory database alive for the pool's lifetime.
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup(DATABASE_URL_VAR) {
            config.url = url;
        }
        if let Some(raw) = lookup(DATABASE_MAX_CONNECTIONS_VAR) {
            let max = raw
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::invalid(DATABASE_MAX_CONNECTIONS_VAR, &raw, e.to_string()))?;
            if max == 0 {
                return Err(ConfigError::invalid(
                    DATABASE_MAX_CONNECTIONS_VAR,
                    &raw,
                    "must be at least 1",
                ));
            }
            config.max_connections = max;
        }
        Ok(config)
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "expected a boolean")),
    }
}
