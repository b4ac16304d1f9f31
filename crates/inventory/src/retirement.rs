//! Store retirement lifecycle.
//!
//! A retirement moves through
//! `Started → Consolidating → Deleting → Committed`; any failure before the
//! commit lands in `RolledBack`. Both terminal states are final.

use serde::{Deserialize, Serialize};

use stockfold_core::{DomainError, DomainResult, StoreId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetirementState {
    /// Transaction opened.
    Started,
    /// Folding the store's stock into the central store.
    Consolidating,
    /// Removing the store row.
    Deleting,
    Committed,
    RolledBack,
}

impl RetirementState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RetirementState::Committed | RetirementState::RolledBack)
    }

    /// Next state on the success path.
    pub fn advance(self) -> DomainResult<Self> {
        match self {
            RetirementState::Started => Ok(RetirementState::Consolidating),
            RetirementState::Consolidating => Ok(RetirementState::Deleting),
            RetirementState::Deleting => Ok(RetirementState::Committed),
            RetirementState::Committed | RetirementState::RolledBack => Err(
                DomainError::invariant(format!("cannot advance from terminal state {self}")),
            ),
        }
    }

    pub fn roll_back(self) -> DomainResult<Self> {
        if self.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot roll back from terminal state {self}"
            )));
        }
        Ok(RetirementState::RolledBack)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RetirementState::Started => "started",
            RetirementState::Consolidating => "consolidating",
            RetirementState::Deleting => "deleting",
            RetirementState::Committed => "committed",
            RetirementState::RolledBack => "rolled_back",
        }
    }
}

impl core::fmt::Display for RetirementState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request to retire `store_id` into the central store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetirementRequest {
    store_id: StoreId,
    central_store_id: StoreId,
}

impl RetirementRequest {
    /// The central store absorbs every retired store and must never be retired itself.
    pub fn new(store_id: StoreId, central_store_id: StoreId) -> DomainResult<Self> {
        if store_id == central_store_id {
            return Err(DomainError::validation(format!(
                "store {store_id} is the central store and cannot be retired"
            )));
        }
        Ok(Self {
            store_id,
            central_store_id,
        })
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn central_store_id(&self) -> StoreId {
        self.central_store_id
    }
}
