use thiserror::Error;

use stockfold_core::{DomainError, StoreId};
use stockfold_inventory::RetirementState;

use crate::stock_store::StockStoreError;

/// Coarse failure classification for callers that branch on the outcome.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request itself is not allowed (e.g. retiring the central store).
    Validation,
    /// A store the operation depends on does not exist.
    NotFound,
    /// The database could not be reached, or the transaction could not be opened or committed.
    Connectivity,
    /// A write would break a uniqueness or value constraint.
    Integrity,
    /// Any other statement or decode failure.
    Storage,
    /// The workflow left its own lifecycle; indicates a bug.
    Internal,
}

/// Why a store retirement did not commit.
///
/// Every variant after validation means the transaction was rolled back and
/// no stock or store row changed.
#[derive(Debug, Error)]
pub enum RetireError {
    #[error("store {0} is the central store and cannot be retired")]
    CentralStore(StoreId),

    #[error("central store {0} does not exist")]
    CentralStoreMissing(StoreId),

    #[error("store {0} not found")]
    StoreNotFound(StoreId),

    #[error("retiring store {store_id} failed while {stage}: {source}")]
    Storage {
        store_id: StoreId,
        stage: RetirementState,
        #[source]
        source: StockStoreError,
    },

    #[error("committing retirement of store {store_id} failed: {source}")]
    Commit {
        store_id: StoreId,
        #[source]
        source: StockStoreError,
    },

    #[error("retirement of store {store_id} broke its lifecycle: {source}")]
    Lifecycle {
        store_id: StoreId,
        #[source]
        source: DomainError,
    },
}

impl RetireError {
    pub(crate) fn storage(store_id: StoreId, stage: RetirementState, source: StockStoreError) -> Self {
        Self::Storage {
            store_id,
            stage,
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RetireError::CentralStore(_) => FailureKind::Validation,
            RetireError::CentralStoreMissing(_) | RetireError::StoreNotFound(_) => {
                FailureKind::NotFound
            }
            RetireError::Storage { source, .. } | RetireError::Commit { source, .. } => {
                match source {
                    StockStoreError::Connectivity(_) => FailureKind::Connectivity,
                    StockStoreError::Integrity(_) => FailureKind::Integrity,
                    StockStoreError::Statement(_) | StockStoreError::Decode(_) => {
                        FailureKind::Storage
                    }
                }
            }
            RetireError::Lifecycle { .. } => FailureKind::Internal,
        }
    }

    /// The store the caller asked to retire. For `CentralStoreMissing` this is
    /// the misconfigured central store id.
    pub fn store_id(&self) -> StoreId {
        match self {
            RetireError::CentralStore(id)
            | RetireError::CentralStoreMissing(id)
            | RetireError::StoreNotFound(id) => *id,
            RetireError::Storage { store_id, .. }
            | RetireError::Commit { store_id, .. }
            | RetireError::Lifecycle { store_id, .. } => *store_id,
        }
    }

    /// Lifecycle state the failure happened in, when a transaction was open.
    pub fn stage(&self) -> Option<RetirementState> {
        match self {
            RetireError::CentralStore(_) => None,
            RetireError::CentralStoreMissing(_) | RetireError::StoreNotFound(_) => {
                Some(RetirementState::Started)
            }
            RetireError::Storage { stage, .. } => Some(*stage),
            RetireError::Commit { .. } => Some(RetirementState::Deleting),
            RetireError::Lifecycle { .. } => None,
        }
    }
}
