//! Database adapters: connection pool and development schema.

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::instrument;

use crate::config::DatabaseConfig;
use crate::stock_store::{StockStoreError, map_sqlx_error};

/// Open a SQLite pool for `config`.
#[instrument(skip(config), fields(url = %config.url, max_connections = config.max_connections), err)]
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, StockStoreError> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| map_sqlx_error("parse_database_url", e))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
    if config.is_in_memory() {
        // An in-memory database lives exactly as long as its connection.
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    pool_options
        .connect_with(options)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Create the minimum `stores` / `stocks` shape the retirement workflow relies on.
///
/// Intended for development databases and tests; deployed schemas are managed
/// outside this crate.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StockStoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stores (
            id INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("create_stores_table", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stocks (
            product_id INTEGER NOT NULL,
            store_id   INTEGER NOT NULL,
            units      INTEGER NOT NULL CHECK (typeof(units) = 'integer' AND units >= 0),
            UNIQUE (product_id, store_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("create_stocks_table", e))?;

    Ok(())
}
