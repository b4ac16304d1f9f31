//! SQLite-backed stock store.
//!
//! Statements are parameterised (`?1`, `?2`, ...) and run on the connection
//! handed in by the caller, so they join whatever transaction it has open.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection};
use tracing::instrument;

use stockfold_core::{ProductId, StoreId};
use stockfold_inventory::{StockRecord, Units};

use super::{StockStore, StockStoreError, map_sqlx_error};

#[derive(Debug, Copy, Clone, Default)]
pub struct SqliteStockStore;

impl SqliteStockStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StockStore for SqliteStockStore {
    #[instrument(skip(self, conn), fields(product_id = %product_id, store_id = %store_id), err)]
    async fn exists(
        &self,
        conn: &mut SqliteConnection,
        product_id: ProductId,
        store_id: StoreId,
    ) -> Result<bool, StockStoreError> {
        let found = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT 1
            FROM stocks
            WHERE product_id = ?1 AND store_id = ?2
            "#,
        )
        .bind(product_id.get())
        .bind(store_id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("stock_exists", e))?;

        Ok(found.is_some())
    }

    #[instrument(skip(self, conn), fields(product_id = %product_id, store_id = %store_id), err)]
    async fn increment(
        &self,
        conn: &mut SqliteConnection,
        product_id: ProductId,
        store_id: StoreId,
        delta: i64,
    ) -> Result<u64, StockStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stocks
            SET units = units + ?1
            WHERE product_id = ?2 AND store_id = ?3
            "#,
        )
        .bind(delta)
        .bind(product_id.get())
        .bind(store_id.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("stock_increment", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(
        skip(self, conn),
        fields(product_id = %record.product_id, store_id = %record.store_id, units = %record.units),
        err
    )]
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        record: &StockRecord,
    ) -> Result<(), StockStoreError> {
        sqlx::query(
            r#"
            INSERT INTO stocks (product_id, store_id, units)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(record.product_id.get())
        .bind(record.store_id.get())
        .bind(record.units.get())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("stock_insert", e))?;

        Ok(())
    }

    #[instrument(
        skip(self, conn),
        fields(product_id = %record.product_id, store_id = %record.store_id, units = %record.units),
        err
    )]
    async fn merge(
        &self,
        conn: &mut SqliteConnection,
        record: &StockRecord,
    ) -> Result<Units, StockStoreError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO stocks (product_id, store_id, units)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (product_id, store_id)
            DO UPDATE SET units = stocks.units + excluded.units
            RETURNING units
            "#,
        )
        .bind(record.product_id.get())
        .bind(record.store_id.get())
        .bind(record.units.get())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("stock_merge", e))?;

        Units::new(total).map_err(|e| {
            StockStoreError::Integrity(format!(
                "merged stock for product {} in store {}: {e}",
                record.product_id, record.store_id
            ))
        })
    }

    #[instrument(skip(self, conn), fields(store_id = %store_id), err)]
    async fn list_for_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<Vec<StockRecord>, StockStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, store_id, units
            FROM stocks
            WHERE store_id = ?1
            ORDER BY product_id ASC
            "#,
        )
        .bind(store_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_for_store", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let row = StockRow::from_row(row)
                .map_err(|e| map_sqlx_error("decode_stock_row", e))?;
            records.push(StockRecord::try_from(row)?);
        }
        Ok(records)
    }

    #[instrument(skip(self, conn), fields(store_id = %store_id), err)]
    async fn delete_for_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<u64, StockStoreError> {
        let result = sqlx::query("DELETE FROM stocks WHERE store_id = ?1")
            .bind(store_id.get())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("delete_stock_for_store", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, conn), fields(store_id = %store_id), err)]
    async fn store_exists(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<bool, StockStoreError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM stores WHERE id = ?1")
            .bind(store_id.get())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("store_exists", e))?;

        Ok(found.is_some())
    }

    #[instrument(skip(self, conn), fields(store_id = %store_id), err)]
    async fn delete_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<u64, StockStoreError> {
        let result = sqlx::query("DELETE FROM stores WHERE id = ?1")
            .bind(store_id.get())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("delete_store", e))?;

        Ok(result.rows_affected())
    }
}

// SQLx row types

#[derive(Debug)]
struct StockRow {
    product_id: i64,
    store_id: i64,
    units: i64,
}

impl<'r> FromRow<'r, SqliteRow> for StockRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            product_id: row.try_get("product_id")?,
            store_id: row.try_get("store_id")?,
            units: row.try_get("units")?,
        })
    }
}

impl TryFrom<StockRow> for StockRecord {
    type Error = StockStoreError;

    fn try_from(row: StockRow) -> Result<Self, Self::Error> {
        let units = Units::new(row.units).map_err(|e| {
            StockStoreError::Integrity(format!(
                "stock row for product {} in store {}: {e}",
                row.product_id, row.store_id
            ))
        })?;
        Ok(StockRecord::new(
            ProductId::new(row.product_id),
            StoreId::new(row.store_id),
            units,
        ))
    }
}
