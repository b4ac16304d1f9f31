//! Integration tests for the full retirement pipeline.
//!
//! Tests: StoreRetirement → StockConsolidator → SqliteStockStore → SQLite
//!
//! Verifies:
//! - Stock is merged additively or carried over into the central store
//! - Failures anywhere in the transaction leave no trace
//! - Retrying a rolled-back retirement does not double-count
//! - Configured policies (missing store, purge, merge strategy) behave as documented

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use proptest::prelude::*;
    use sqlx::{SqliteConnection, SqlitePool};

    use stockfold_core::{ProductId, StoreId};
    use stockfold_inventory::{MergeAction, RetirementState, StockLevels, StockRecord, Units};

    use crate::config::{DatabaseConfig, MergeStrategy, MissingStorePolicy, RetirementConfig};
    use crate::db;
    use crate::retirement::{FailureKind, RetireError, StoreRetirement};
    use crate::stock_store::{SqliteStockStore, StockStore, StockStoreError};

    const CENTRAL: StoreId = StoreId::new(1);
    const RETIRING: StoreId = StoreId::new(5);

    const STRATEGIES: [MergeStrategy; 2] = [MergeStrategy::Upsert, MergeStrategy::CheckThenAct];

    async fn setup() -> SqlitePool {
        stockfold_observability::init();
        let pool = db::connect(&DatabaseConfig::default()).await.unwrap();
        db::ensure_schema(&pool).await.unwrap();
        pool
    }

    async fn seed_store(pool: &SqlitePool, id: i64) {
        sqlx::query("INSERT INTO stores (id) VALUES (?1)")
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn seed_stock(pool: &SqlitePool, product: i64, store: i64, units: i64) {
        sqlx::query("INSERT INTO stocks (product_id, store_id, units) VALUES (?1, ?2, ?3)")
            .bind(product)
            .bind(store)
            .bind(units)
            .execute(pool)
            .await
            .unwrap();
    }

    /// The concrete example: store 5 holds (10, 3) and (11, 7); central holds (10, 2).
    async fn seed_scenario(pool: &SqlitePool) {
        seed_store(pool, CENTRAL.get()).await;
        seed_store(pool, RETIRING.get()).await;
        seed_stock(pool, 10, RETIRING.get(), 3).await;
        seed_stock(pool, 11, RETIRING.get(), 7).await;
        seed_stock(pool, 10, CENTRAL.get(), 2).await;
    }

    async fn stock_of(pool: &SqlitePool, store: StoreId) -> Vec<(i64, i64)> {
        sqlx::query_as::<_, (i64, i64)>(
            "SELECT product_id, units FROM stocks WHERE store_id = ?1 ORDER BY product_id",
        )
        .bind(store.get())
        .fetch_all(pool)
        .await
        .unwrap()
    }

    async fn store_ids(pool: &SqlitePool) -> Vec<i64> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM stores ORDER BY id")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    fn retirement(pool: &SqlitePool, config: RetirementConfig) -> StoreRetirement<SqliteStockStore> {
        StoreRetirement::new(pool.clone(), SqliteStockStore::new(), config)
    }

    /// Wraps the SQLite store to inject faults.
    struct FaultyStore {
        inner: SqliteStockStore,
        /// Fail the n-th (1-based) merge/insert with a connectivity error.
        fail_write: Option<usize>,
        /// Pretend no target row ever exists.
        blind_exists: bool,
        /// Pretend every target row exists.
        phantom_exists: bool,
        writes: AtomicUsize,
    }

    impl FaultyStore {
        fn failing_write(n: usize) -> Self {
            Self {
                inner: SqliteStockStore::new(),
                fail_write: Some(n),
                blind_exists: false,
                phantom_exists: false,
                writes: AtomicUsize::new(0),
            }
        }

        fn blind() -> Self {
            Self {
                inner: SqliteStockStore::new(),
                fail_write: None,
                blind_exists: true,
                phantom_exists: false,
                writes: AtomicUsize::new(0),
            }
        }

        fn phantom() -> Self {
            Self {
                inner: SqliteStockStore::new(),
                fail_write: None,
                blind_exists: false,
                phantom_exists: true,
                writes: AtomicUsize::new(0),
            }
        }

        fn check_write(&self) -> Result<(), StockStoreError> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_write == Some(n) {
                return Err(StockStoreError::Connectivity(format!("injected failure on write {n}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StockStore for FaultyStore {
        async fn exists(
            &self,
            conn: &mut SqliteConnection,
            product_id: ProductId,
            store_id: StoreId,
        ) -> Result<bool, StockStoreError> {
            if self.blind_exists {
                return Ok(false);
            }
            if self.phantom_exists {
                return Ok(true);
            }
            self.inner.exists(conn, product_id, store_id).await
        }

        async fn increment(
            &self,
            conn: &mut SqliteConnection,
            product_id: ProductId,
            store_id: StoreId,
            delta: i64,
        ) -> Result<u64, StockStoreError> {
            self.check_write()?;
            self.inner.increment(conn, product_id, store_id, delta).await
        }

        async fn insert(
            &self,
            conn: &mut SqliteConnection,
            record: &StockRecord,
        ) -> Result<(), StockStoreError> {
            self.check_write()?;
            self.inner.insert(conn, record).await
        }

        async fn merge(
            &self,
            conn: &mut SqliteConnection,
            record: &StockRecord,
        ) -> Result<Units, StockStoreError> {
            self.check_write()?;
            self.inner.merge(conn, record).await
        }

        async fn list_for_store(
            &self,
            conn: &mut SqliteConnection,
            store_id: StoreId,
        ) -> Result<Vec<StockRecord>, StockStoreError> {
            self.inner.list_for_store(conn, store_id).await
        }

        async fn delete_for_store(
            &self,
            conn: &mut SqliteConnection,
            store_id: StoreId,
        ) -> Result<u64, StockStoreError> {
            self.inner.delete_for_store(conn, store_id).await
        }

        async fn store_exists(
            &self,
            conn: &mut SqliteConnection,
            store_id: StoreId,
        ) -> Result<bool, StockStoreError> {
            self.inner.store_exists(conn, store_id).await
        }

        async fn delete_store(
            &self,
            conn: &mut SqliteConnection,
            store_id: StoreId,
        ) -> Result<u64, StockStoreError> {
            self.inner.delete_store(conn, store_id).await
        }
    }

    #[tokio::test]
    async fn retiring_store_five_folds_its_stock_into_central() {
        for strategy in STRATEGIES {
            let pool = setup().await;
            seed_scenario(&pool).await;

            let report = retirement(&pool, RetirementConfig::new(CENTRAL).with_merge_strategy(strategy))
                .retire_store(RETIRING)
                .await
                .unwrap();

            assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 5), (11, 7)], "{strategy}");
            assert_eq!(store_ids(&pool).await, vec![1]);
            assert!(report.store_deleted);
            assert_eq!(report.summary.products(), 2);
            assert_eq!(report.summary.units_moved().unwrap(), Units::new(10).unwrap());
        }
    }

    #[tokio::test]
    async fn check_then_act_reports_increment_and_insert() {
        let pool = setup().await;
        seed_scenario(&pool).await;

        let report = retirement(
            &pool,
            RetirementConfig::new(CENTRAL).with_merge_strategy(MergeStrategy::CheckThenAct),
        )
        .retire_store(RETIRING)
        .await
        .unwrap();

        let actions: Vec<_> = report
            .summary
            .merges()
            .iter()
            .map(|m| (m.product_id.get(), m.units.get(), m.action))
            .collect();
        assert_eq!(
            actions,
            vec![(10, 3, MergeAction::Increment), (11, 7, MergeAction::Insert)]
        );
        assert_eq!(report.summary.count(MergeAction::Upsert), 0);
    }

    #[tokio::test]
    async fn source_stock_rows_are_kept_unless_purged() {
        let pool = setup().await;
        seed_scenario(&pool).await;
        let report = retirement(&pool, RetirementConfig::new(CENTRAL))
            .retire_store(RETIRING)
            .await
            .unwrap();
        assert_eq!(report.source_rows_purged, 0);
        assert_eq!(stock_of(&pool, RETIRING).await, vec![(10, 3), (11, 7)]);

        let pool = setup().await;
        seed_scenario(&pool).await;
        let report = retirement(&pool, RetirementConfig::new(CENTRAL).with_purge_source_stock(true))
            .retire_store(RETIRING)
            .await
            .unwrap();
        assert_eq!(report.source_rows_purged, 2);
        assert!(stock_of(&pool, RETIRING).await.is_empty());
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 5), (11, 7)]);
    }

    #[tokio::test]
    async fn store_without_stock_is_still_deleted() {
        let pool = setup().await;
        seed_store(&pool, CENTRAL.get()).await;
        seed_store(&pool, 6).await;
        seed_stock(&pool, 10, CENTRAL.get(), 2).await;

        let report = retirement(&pool, RetirementConfig::new(CENTRAL))
            .retire_store(StoreId::new(6))
            .await
            .unwrap();

        assert!(report.summary.is_empty());
        assert!(report.store_deleted);
        assert_eq!(store_ids(&pool).await, vec![1]);
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 2)]);
    }

    #[tokio::test]
    async fn missing_store_commits_without_changes() {
        let pool = setup().await;
        seed_scenario(&pool).await;

        let report = retirement(&pool, RetirementConfig::new(CENTRAL))
            .retire_store(StoreId::new(9999))
            .await
            .unwrap();

        assert!(!report.store_deleted);
        assert!(report.summary.is_empty());
        assert_eq!(store_ids(&pool).await, vec![1, 5]);
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 2)]);
    }

    #[tokio::test]
    async fn retiring_the_same_store_twice_does_not_double_count() {
        let pool = setup().await;
        seed_scenario(&pool).await;
        let retire = retirement(&pool, RetirementConfig::new(CENTRAL));

        retire.retire_store(RETIRING).await.unwrap();
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 5), (11, 7)]);

        let again = retire.retire_store(RETIRING).await.unwrap();
        assert!(!again.store_deleted);
        assert!(again.summary.is_empty());
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 5), (11, 7)]);
        assert_eq!(stock_of(&pool, RETIRING).await, vec![(10, 3), (11, 7)]);
        assert_eq!(store_ids(&pool).await, vec![1]);
    }

    #[tokio::test]
    async fn stock_under_an_unknown_store_is_left_alone() {
        let pool = setup().await;
        seed_scenario(&pool).await;
        seed_stock(&pool, 10, 77, 40).await;

        let report = retirement(&pool, RetirementConfig::new(CENTRAL).with_purge_source_stock(true))
            .retire_store(StoreId::new(77))
            .await
            .unwrap();

        assert!(!report.store_deleted);
        assert_eq!(report.source_rows_purged, 0);
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 2)]);
        assert_eq!(stock_of(&pool, StoreId::new(77)).await, vec![(10, 40)]);
    }

    #[tokio::test]
    async fn missing_store_is_not_found_under_reject_policy() {
        let pool = setup().await;
        seed_scenario(&pool).await;

        let err = retirement(
            &pool,
            RetirementConfig::new(CENTRAL).with_missing_store(MissingStorePolicy::Reject),
        )
        .retire_store(StoreId::new(9999))
        .await
        .unwrap_err();

        assert!(matches!(err, RetireError::StoreNotFound(id) if id == StoreId::new(9999)));
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert_eq!(store_ids(&pool).await, vec![1, 5]);
    }

    #[tokio::test]
    async fn central_store_cannot_retire_itself() {
        let pool = setup().await;
        seed_scenario(&pool).await;

        let err = retirement(&pool, RetirementConfig::new(CENTRAL))
            .retire_store(CENTRAL)
            .await
            .unwrap_err();

        assert!(matches!(err, RetireError::CentralStore(_)));
        assert_eq!(err.kind(), FailureKind::Validation);
        assert_eq!(store_ids(&pool).await, vec![1, 5]);
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 2)]);
    }

    #[tokio::test]
    async fn missing_central_store_rolls_back() {
        let pool = setup().await;
        seed_store(&pool, RETIRING.get()).await;
        seed_stock(&pool, 10, RETIRING.get(), 3).await;

        let err = retirement(&pool, RetirementConfig::new(CENTRAL))
            .retire_store(RETIRING)
            .await
            .unwrap_err();

        assert!(matches!(err, RetireError::CentralStoreMissing(id) if id == CENTRAL));
        assert_eq!(store_ids(&pool).await, vec![5]);
        assert!(stock_of(&pool, CENTRAL).await.is_empty());
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_earlier_merges() {
        for strategy in STRATEGIES {
            let pool = setup().await;
            seed_scenario(&pool).await;
            seed_stock(&pool, 12, RETIRING.get(), 4).await;
            sqlx::query(
                r#"
                CREATE TRIGGER reject_product_12 BEFORE INSERT ON stocks
                WHEN NEW.product_id = 12 AND NEW.store_id = 1
                BEGIN
                    SELECT RAISE(ABORT, 'injected failure');
                END
                "#,
            )
            .execute(&pool)
            .await
            .unwrap();

            let err = retirement(&pool, RetirementConfig::new(CENTRAL).with_merge_strategy(strategy))
                .retire_store(RETIRING)
                .await
                .unwrap_err();

            assert_eq!(err.kind(), FailureKind::Storage, "{strategy}");
            assert_eq!(err.stage(), Some(RetirementState::Consolidating));
            // Products 10 and 11 were merged before 12 failed; none of it survives.
            assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 2)]);
            assert_eq!(store_ids(&pool).await, vec![1, 5]);
        }
    }

    #[tokio::test]
    async fn retry_after_fault_matches_a_single_clean_run() {
        let pool = setup().await;
        seed_scenario(&pool).await;

        let faulty = StoreRetirement::new(
            pool.clone(),
            FaultyStore::failing_write(2),
            RetirementConfig::new(CENTRAL),
        );
        let err = faulty.retire_store(RETIRING).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Connectivity);
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 2)]);
        assert_eq!(store_ids(&pool).await, vec![1, 5]);

        retirement(&pool, RetirementConfig::new(CENTRAL))
            .retire_store(RETIRING)
            .await
            .unwrap();

        let clean = setup().await;
        seed_scenario(&clean).await;
        retirement(&clean, RetirementConfig::new(CENTRAL))
            .retire_store(RETIRING)
            .await
            .unwrap();

        assert_eq!(stock_of(&pool, CENTRAL).await, stock_of(&clean, CENTRAL).await);
        assert_eq!(store_ids(&pool).await, store_ids(&clean).await);
    }

    #[tokio::test]
    async fn duplicate_insert_is_an_integrity_failure() {
        let pool = setup().await;
        seed_scenario(&pool).await;

        let blind = StoreRetirement::new(
            pool.clone(),
            Arc::new(FaultyStore::blind()),
            RetirementConfig::new(CENTRAL).with_merge_strategy(MergeStrategy::CheckThenAct),
        );
        let err = blind.retire_store(RETIRING).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Integrity);
        assert!(matches!(
            err,
            RetireError::Storage { source: StockStoreError::Integrity(_), .. }
        ));
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 2)]);
    }

    #[tokio::test]
    async fn increment_of_a_vanished_row_rolls_back() {
        let pool = setup().await;
        seed_scenario(&pool).await;

        let phantom = StoreRetirement::new(
            pool.clone(),
            FaultyStore::phantom(),
            RetirementConfig::new(CENTRAL).with_merge_strategy(MergeStrategy::CheckThenAct),
        );
        let err = phantom.retire_store(RETIRING).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Integrity);
        assert_eq!(err.stage(), Some(RetirementState::Consolidating));
        assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, 2)]);
        assert_eq!(store_ids(&pool).await, vec![1, 5]);
    }

    #[tokio::test]
    async fn overflowing_units_roll_back() {
        for strategy in STRATEGIES {
            let pool = setup().await;
            seed_store(&pool, CENTRAL.get()).await;
            seed_store(&pool, RETIRING.get()).await;
            seed_stock(&pool, 10, CENTRAL.get(), i64::MAX).await;
            seed_stock(&pool, 10, RETIRING.get(), 1).await;

            let err = retirement(&pool, RetirementConfig::new(CENTRAL).with_merge_strategy(strategy))
                .retire_store(RETIRING)
                .await
                .unwrap_err();

            assert_eq!(err.kind(), FailureKind::Integrity, "{strategy}");
            assert_eq!(stock_of(&pool, CENTRAL).await, vec![(10, i64::MAX)]);
            assert_eq!(store_ids(&pool).await, vec![1, 5]);
        }
    }

    #[tokio::test]
    async fn closed_pool_is_a_connectivity_failure() {
        let pool = setup().await;
        seed_scenario(&pool).await;
        let retire = retirement(&pool, RetirementConfig::new(CENTRAL));
        pool.close().await;

        let err = retire.retire_store(RETIRING).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Connectivity);
        assert_eq!(err.stage(), Some(RetirementState::Started));
        assert!(!retire.retire_store_ok(RETIRING).await);
    }

    #[tokio::test]
    async fn boolean_facade_reports_success() {
        let pool = setup().await;
        seed_scenario(&pool).await;
        let retire = retirement(&pool, RetirementConfig::new(CENTRAL));

        assert!(retire.retire_store_ok(RETIRING).await);
        assert!(!retire.retire_store_ok(CENTRAL).await);
    }

    #[tokio::test]
    async fn increment_without_matching_row_is_a_silent_no_op() {
        let pool = setup().await;
        seed_scenario(&pool).await;
        let store = SqliteStockStore::new();
        let mut conn = pool.acquire().await.unwrap();

        let affected = store
            .increment(&mut *conn, ProductId::new(99), CENTRAL, 5)
            .await
            .unwrap();
        assert_eq!(affected, 0);

        assert!(store.exists(&mut *conn, ProductId::new(10), CENTRAL).await.unwrap());
        assert!(!store.exists(&mut *conn, ProductId::new(11), CENTRAL).await.unwrap());

        let dup = StockRecord::new(ProductId::new(10), CENTRAL, Units::new(1).unwrap());
        let err = store.insert(&mut *conn, &dup).await.unwrap_err();
        assert!(matches!(err, StockStoreError::Integrity(_)));

        let total = store.merge(&mut *conn, &dup).await.unwrap();
        assert_eq!(total, Units::new(3).unwrap());
    }

    fn levels_strategy(store: StoreId) -> impl Strategy<Value = StockLevels> {
        prop::collection::btree_map(0i64..30, 0i64..10_000, 0..12).prop_map(move |map| {
            StockLevels::from_records(
                store,
                map.into_iter()
                    .map(|(p, u)| StockRecord::new(ProductId::new(p), store, Units::new(u).unwrap())),
            )
            .unwrap()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn database_merge_matches_the_domain_model(
            central in levels_strategy(CENTRAL),
            source in levels_strategy(RETIRING),
            strategy_idx in 0usize..2,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let actual = rt.block_on(async {
                let pool = setup().await;
                seed_store(&pool, CENTRAL.get()).await;
                seed_store(&pool, RETIRING.get()).await;
                for r in central.records().into_iter().chain(source.records()) {
                    seed_stock(&pool, r.product_id.get(), r.store_id.get(), r.units.get()).await;
                }
                retirement(&pool, RetirementConfig::new(CENTRAL).with_merge_strategy(STRATEGIES[strategy_idx]))
                    .retire_store(RETIRING)
                    .await
                    .unwrap();
                stock_of(&pool, CENTRAL).await
            });

            let mut expected = central.clone();
            expected.absorb_all(&source).unwrap();
            let expected: Vec<(i64, i64)> = expected
                .records()
                .iter()
                .map(|r| (r.product_id.get(), r.units.get()))
                .collect();

            prop_assert_eq!(actual, expected);
        }
    }
}
