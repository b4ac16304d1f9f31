//! Data access for the `stocks` and `stores` tables.
//!
//! Every operation borrows the connection of the caller's open transaction;
//! nothing here begins, commits or rolls back. That keeps the unit of
//! atomicity in the hands of the retirement workflow.

pub mod error;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqliteConnection;

use stockfold_core::{ProductId, StoreId};
use stockfold_inventory::{StockRecord, Units};

pub use error::{StockStoreError, map_sqlx_error};
pub use sqlite::SqliteStockStore;

/// Parameterised primitives over stock rows, with no business rules.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Whether a record exists for exactly this `(product, store)` pair.
    async fn exists(
        &self,
        conn: &mut SqliteConnection,
        product_id: ProductId,
        store_id: StoreId,
    ) -> Result<bool, StockStoreError>;

    /// Add `delta` to the matching row's units. Returns rows affected; zero is
    /// a silent no-op.
    async fn increment(
        &self,
        conn: &mut SqliteConnection,
        product_id: ProductId,
        store_id: StoreId,
        delta: i64,
    ) -> Result<u64, StockStoreError>;

    /// Insert a new row. A row already present for the pair is an `Integrity` error.
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        record: &StockRecord,
    ) -> Result<(), StockStoreError>;

    /// Atomic insert-or-add; returns the resulting units of the row.
    async fn merge(
        &self,
        conn: &mut SqliteConnection,
        record: &StockRecord,
    ) -> Result<Units, StockStoreError>;

    /// All records held by `store_id`, ordered by product.
    async fn list_for_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<Vec<StockRecord>, StockStoreError>;

    /// Delete every stock row of `store_id`. Returns rows affected.
    async fn delete_for_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<u64, StockStoreError>;

    /// Whether a `stores` row exists for `store_id`.
    async fn store_exists(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<bool, StockStoreError>;

    /// Delete the store row. Returns rows affected (zero when it never existed).
    async fn delete_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<u64, StockStoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn exists(
        &self,
        conn: &mut SqliteConnection,
        product_id: ProductId,
        store_id: StoreId,
    ) -> Result<bool, StockStoreError> {
        (**self).exists(conn, product_id, store_id).await
    }

    async fn increment(
        &self,
        conn: &mut SqliteConnection,
        product_id: ProductId,
        store_id: StoreId,
        delta: i64,
    ) -> Result<u64, StockStoreError> {
        (**self).increment(conn, product_id, store_id, delta).await
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        record: &StockRecord,
    ) -> Result<(), StockStoreError> {
        (**self).insert(conn, record).await
    }

    async fn merge(
        &self,
        conn: &mut SqliteConnection,
        record: &StockRecord,
    ) -> Result<Units, StockStoreError> {
        (**self).merge(conn, record).await
    }

    async fn list_for_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<Vec<StockRecord>, StockStoreError> {
        (**self).list_for_store(conn, store_id).await
    }

    async fn delete_for_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<u64, StockStoreError> {
        (**self).delete_for_store(conn, store_id).await
    }

    async fn store_exists(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<bool, StockStoreError> {
        (**self).store_exists(conn, store_id).await
    }

    async fn delete_store(
        &self,
        conn: &mut SqliteConnection,
        store_id: StoreId,
    ) -> Result<u64, StockStoreError> {
        (**self).delete_store(conn, store_id).await
    }
}
