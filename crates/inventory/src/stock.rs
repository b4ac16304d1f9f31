use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockfold_core::{DomainError, DomainResult, Entity, ProductId, StoreId, ValueObject};

/// Quantity of one product held by one store. Never negative.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Units(i64);

impl Units {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: i64) -> DomainResult<Self> {
        if raw < 0 {
            return Err(DomainError::validation(format!(
                "units cannot be negative (got {raw})"
            )));
        }
        Ok(Self(raw))
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    /// Additive merge of two quantities.
    pub fn checked_add(self, other: Self) -> DomainResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or_else(|| DomainError::invariant(format!("units overflow: {self} + {other}")))
    }
}

impl ValueObject for Units {}

impl core::fmt::Display for Units {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<i64> for Units {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Units> for i64 {
    fn from(value: Units) -> Self {
        value.0
    }
}

/// One row of the `stocks` table: `units` of `product_id` held by `store_id`.
///
/// At most one record exists per `(product_id, store_id)` pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub units: Units,
}

impl StockRecord {
    pub fn new(product_id: ProductId, store_id: StoreId, units: Units) -> Self {
        Self {
            product_id,
            store_id,
            units,
        }
    }

    /// The same product and quantity, held by `store_id` instead.
    pub fn rehomed(&self, store_id: StoreId) -> Self {
        Self {
            store_id,
            ..*self
        }
    }
}

impl Entity for StockRecord {
    type Id = (ProductId, StoreId);

    fn id(&self) -> Self::Id {
        (self.product_id, self.store_id)
    }
}

/// How a source record was folded into the target store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    /// The target already held the product; its units were increased.
    Increment,
    /// The target did not hold the product; a new record was created.
    Insert,
    /// Single atomic insert-or-add; which branch the database took is not observed.
    Upsert,
}

impl MergeAction {
    /// Branch selection for the check-then-act merge.
    pub fn for_existing(target_has_product: bool) -> Self {
        if target_has_product {
            MergeAction::Increment
        } else {
            MergeAction::Insert
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MergeAction::Increment => "increment",
            MergeAction::Insert => "insert",
            MergeAction::Upsert => "upsert",
        }
    }
}

/// In-memory stock levels of a single store.
///
/// Mirrors the consolidation rules without touching storage: absorbing a
/// record adds to an existing product's units or carries the quantity over
/// as a new product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevels {
    store_id: StoreId,
    levels: BTreeMap<ProductId, Units>,
}

impl StockLevels {
    pub fn new(store_id: StoreId) -> Self {
        Self {
            store_id,
            levels: BTreeMap::new(),
        }
    }

    /// Build from existing rows. Rows must belong to `store_id` and name each product once.
    pub fn from_records(
        store_id: StoreId,
        records: impl IntoIterator<Item = StockRecord>,
    ) -> DomainResult<Self> {
        let mut levels = Self::new(store_id);
        for record in records {
            if record.store_id != store_id {
                return Err(DomainError::invariant(format!(
                    "record for store {} does not belong to store {store_id}",
                    record.store_id
                )));
            }
            if levels.levels.insert(record.product_id, record.units).is_some() {
                return Err(DomainError::conflict(format!(
                    "duplicate stock record for product {} in store {store_id}",
                    record.product_id
                )));
            }
        }
        Ok(levels)
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn get(&self, product_id: ProductId) -> Option<Units> {
        self.levels.get(&product_id).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Sum of units across all products.
    pub fn total(&self) -> DomainResult<Units> {
        self.levels
            .values()
            .try_fold(Units::ZERO, |acc, units| acc.checked_add(*units))
    }

    /// Rows in product order, owned by this store.
    pub fn records(&self) -> Vec<StockRecord> {
        self.levels
            .iter()
            .map(|(product_id, units)| StockRecord::new(*product_id, self.store_id, *units))
            .collect()
    }

    /// Fold one record (from any store) into these levels.
    pub fn absorb(&mut self, record: &StockRecord) -> DomainResult<MergeAction> {
        match self.levels.get_mut(&record.product_id) {
            Some(existing) => {
                *existing = existing.checked_add(record.units)?;
                Ok(MergeAction::Increment)
            }
            None => {
                self.levels.insert(record.product_id, record.units);
                Ok(MergeAction::Insert)
            }
        }
    }

    /// Fold every record of `source` into these levels.
    pub fn absorb_all(&mut self, source: &StockLevels) -> DomainResult<Vec<(ProductId, MergeAction)>> {
        let mut actions = Vec::with_capacity(source.len());
        for record in source.records() {
            actions.push((record.product_id, self.absorb(&record)?));
        }
        Ok(actions)
    }
}
