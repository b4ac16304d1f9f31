//! Store retirement workflow.
//!
//! Retiring a store folds its stock into the central store and deletes the
//! store row inside one SQLite transaction:
//!
//! 1. **Started**: transaction opened, central and retiring store checked for
//!    existence; a missing retiring store either fails (`MissingStorePolicy::Reject`)
//!    or commits with nothing changed
//! 2. **Consolidating**: every stock row of the store is merged into the central store
//! 3. **Deleting**: optional purge of the store's own stock rows, then the store row
//! 4. **Committed**, or **RolledBack** on any failure in steps 1-3 or in the commit
//!
//! Either everything above is visible afterwards or nothing is, so a failed
//! call can be retried without double-counting stock.

mod error;

pub use error::{FailureKind, RetireError};

use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, error, info, instrument, warn};

use stockfold_core::StoreId;
use stockfold_inventory::{RetirementRequest, RetirementState};

use crate::config::{MissingStorePolicy, RetirementConfig};
use crate::consolidation::{ConsolidationSummary, StockConsolidator};
use crate::stock_store::{StockStore, map_sqlx_error};

/// Outcome of a committed retirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetirementReport {
    pub store_id: StoreId,
    pub central_store_id: StoreId,
    pub summary: ConsolidationSummary,
    /// Stock rows of the retired store deleted by the purge option.
    pub source_rows_purged: u64,
    /// `false` when no store row matched (the store never existed).
    pub store_deleted: bool,
}

/// Entry point for retiring stores into the configured central store.
#[derive(Debug, Clone)]
pub struct StoreRetirement<S> {
    pool: SqlitePool,
    consolidator: StockConsolidator<S>,
    config: RetirementConfig,
}

impl<S: StockStore> StoreRetirement<S> {
    pub fn new(pool: SqlitePool, store: S, config: RetirementConfig) -> Self {
        Self {
            pool,
            consolidator: StockConsolidator::new(store, config.merge_strategy),
            config,
        }
    }

    pub fn config(&self) -> &RetirementConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Retire `store_id`: merge its stock into the central store and delete
    /// it, atomically.
    #[instrument(
        skip(self),
        fields(store_id = %store_id, central_store_id = %self.config.central_store_id),
        err
    )]
    pub async fn retire_store(&self, store_id: StoreId) -> Result<RetirementReport, RetireError> {
        let request = RetirementRequest::new(store_id, self.config.central_store_id)
            .map_err(|_| RetireError::CentralStore(store_id))?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            RetireError::storage(
                store_id,
                RetirementState::Started,
                map_sqlx_error("begin_transaction", e),
            )
        })?;
        let mut state = RetirementState::Started;

        let outcome = match self.run(&mut *tx, request, &mut state).await {
            Ok(report) => advance(state, store_id).map(|committed| (report, committed)),
            Err(err) => Err(err),
        };

        let (report, committed) = match outcome {
            Ok(ok) => ok,
            Err(err) => {
                roll_back(tx, state, &err).await;
                return Err(err);
            }
        };

        if let Err(e) = tx.commit().await {
            let err = RetireError::Commit {
                store_id,
                source: map_sqlx_error("commit_transaction", e),
            };
            warn!(
                store_id = %store_id,
                state = %RetirementState::RolledBack,
                error = %err,
                "commit failed; store retirement rolled back"
            );
            return Err(err);
        }

        info!(
            store_id = %store_id,
            central_store_id = %report.central_store_id,
            state = %committed,
            products = report.summary.products(),
            source_rows_purged = report.source_rows_purged,
            store_deleted = report.store_deleted,
            "store retired"
        );
        Ok(report)
    }

    /// Boolean facade over `retire_store`: `true` when committed. Failures
    /// are logged with their kind and cause.
    pub async fn retire_store_ok(&self, store_id: StoreId) -> bool {
        match self.retire_store(store_id).await {
            Ok(_) => true,
            Err(err) => {
                error!(
                    store_id = %err.store_id(),
                    kind = ?err.kind(),
                    error = %err,
                    "failed to retire store"
                );
                false
            }
        }
    }

    async fn run(
        &self,
        conn: &mut SqliteConnection,
        request: RetirementRequest,
        state: &mut RetirementState,
    ) -> Result<RetirementReport, RetireError> {
        let store_id = request.store_id();
        let central_store_id = request.central_store_id();
        let store = self.consolidator.store();

        let central_exists = store
            .store_exists(conn, central_store_id)
            .await
            .map_err(|e| RetireError::storage(store_id, *state, e))?;
        if !central_exists {
            return Err(RetireError::CentralStoreMissing(central_store_id));
        }

        let store_exists = store
            .store_exists(conn, store_id)
            .await
            .map_err(|e| RetireError::storage(store_id, *state, e))?;
        if !store_exists {
            if self.config.missing_store == MissingStorePolicy::Reject {
                return Err(RetireError::StoreNotFound(store_id));
            }
            // Stock rows under an id with no store row were folded by an earlier retirement.
            *state = advance(*state, store_id)?;
            *state = advance(*state, store_id)?;
            debug!(store_id = %store_id, "no store row matched; nothing consolidated or deleted");
            return Ok(RetirementReport {
                store_id,
                central_store_id,
                summary: ConsolidationSummary::default(),
                source_rows_purged: 0,
                store_deleted: false,
            });
        }

        *state = advance(*state, store_id)?;
        let summary = self
            .consolidator
            .consolidate(conn, store_id, central_store_id)
            .await
            .map_err(|e| RetireError::storage(store_id, *state, e))?;

        *state = advance(*state, store_id)?;
        let source_rows_purged = if self.config.purge_source_stock {
            store
                .delete_for_store(conn, store_id)
                .await
                .map_err(|e| RetireError::storage(store_id, *state, e))?
        } else {
            0
        };

        let deleted = store
            .delete_store(conn, store_id)
            .await
            .map_err(|e| RetireError::storage(store_id, *state, e))?;

        Ok(RetirementReport {
            store_id,
            central_store_id,
            summary,
            source_rows_purged,
            store_deleted: deleted > 0,
        })
    }
}

fn advance(state: RetirementState, store_id: StoreId) -> Result<RetirementState, RetireError> {
    let next = state
        .advance()
        .map_err(|source| RetireError::Lifecycle { store_id, source })?;
    debug!(store_id = %store_id, from = %state, to = %next, "retirement state");
    Ok(next)
}

async fn roll_back(tx: Transaction<'_, Sqlite>, state: RetirementState, err: &RetireError) {
    let store_id = err.store_id();
    if let Err(e) = tx.rollback().await {
        // Dropping the transaction still discards its work with the connection.
        warn!(store_id = %store_id, error = %e, "explicit rollback failed");
    }

    let final_state = state.roll_back().unwrap_or(RetirementState::RolledBack);
    warn!(
        store_id = %store_id,
        failed_in = %state,
        state = %final_state,
        kind = ?err.kind(),
        error = %err,
        "store retirement rolled back"
    );
}
