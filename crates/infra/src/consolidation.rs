//! Folding one store's stock into another.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use stockfold_core::{DomainResult, ProductId, StoreId};
use stockfold_inventory::{MergeAction, StockRecord, Units};

use crate::config::MergeStrategy;
use crate::stock_store::{StockStore, StockStoreError};

/// One source product folded into the target store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ProductMerge {
    pub product_id: ProductId,
    /// Units carried over from the source store.
    pub units: Units,
    pub action: MergeAction,
}

/// What a consolidation did, in product order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationSummary {
    merges: Vec<ProductMerge>,
}

impl ConsolidationSummary {
    pub fn merges(&self) -> &[ProductMerge] {
        &self.merges
    }

    pub fn products(&self) -> usize {
        self.merges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }

    pub fn units_moved(&self) -> DomainResult<Units> {
        self.merges
            .iter()
            .try_fold(Units::ZERO, |acc, merge| acc.checked_add(merge.units))
    }

    pub fn count(&self, action: MergeAction) -> usize {
        self.merges.iter().filter(|m| m.action == action).count()
    }
}

/// Folds every stock record of a source store into a target store.
///
/// Quantities always combine: a product the target already holds gets the
/// source units added, a product it lacks is carried over unchanged. The
/// source store's own rows are left untouched.
#[derive(Debug, Clone)]
pub struct StockConsolidator<S> {
    store: S,
    strategy: MergeStrategy,
}

impl<S> StockConsolidator<S> {
    pub fn new(store: S, strategy: MergeStrategy) -> Self {
        Self { store, strategy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }
}

impl<S: StockStore> StockConsolidator<S> {
    /// Any failure returns immediately; the caller must roll back the
    /// surrounding transaction so no partial merge survives.
    #[instrument(
        skip(self, conn),
        fields(source = %source, target = %target, strategy = %self.strategy),
        err
    )]
    pub async fn consolidate(
        &self,
        conn: &mut SqliteConnection,
        source: StoreId,
        target: StoreId,
    ) -> Result<ConsolidationSummary, StockStoreError> {
        let records = self.store.list_for_store(conn, source).await?;
        let mut summary = ConsolidationSummary {
            merges: Vec::with_capacity(records.len()),
        };

        for record in records {
            let incoming = record.rehomed(target);
            let action = match self.strategy {
                MergeStrategy::Upsert => {
                    let total = self.store.merge(conn, &incoming).await?;
                    debug!(product_id = %record.product_id, units = %record.units, total = %total, "merged stock");
                    MergeAction::Upsert
                }
                MergeStrategy::CheckThenAct => self.check_then_act(conn, &incoming).await?,
            };

            summary.merges.push(ProductMerge {
                product_id: record.product_id,
                units: record.units,
                action,
            });
        }

        Ok(summary)
    }

    async fn check_then_act(
        &self,
        conn: &mut SqliteConnection,
        incoming: &StockRecord,
    ) -> Result<MergeAction, StockStoreError> {
        let exists = self
            .store
            .exists(conn, incoming.product_id, incoming.store_id)
            .await?;

        if exists {
            let affected = self
                .store
                .increment(conn, incoming.product_id, incoming.store_id, incoming.units.get())
                .await?;
            if affected == 0 {
                return Err(StockStoreError::Integrity(format!(
                    "increment matched no row for product {} in store {}",
                    incoming.product_id, incoming.store_id
                )));
            }
        } else {
            self.store.insert(conn, incoming).await?;
        }

        let action = MergeAction::for_existing(exists);
        debug!(
            product_id = %incoming.product_id,
            units = %incoming.units,
            action = action.as_str(),
            "merged stock"
        );
        Ok(action)
    }
}
