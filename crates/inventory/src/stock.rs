use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, ValueObject};

/// Product variant identifier.
///
/// The catalog itself (attributes, slugs, pricing) lives outside this core;
/// the fulfillment engines only ever reference variants by id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub AggregateId);

impl VariantId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VariantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Warehouse identifier.
///
/// Ordered so allocation can tie-break deterministically by ascending id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(pub AggregateId);

impl WarehouseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stock counters for one (variant, warehouse) pair.
///
/// Created lazily on first movement into the pair and mutated exclusively
/// through [`crate::InventoryLedger`] operations, which uphold:
///
/// - `quantity >= 0`
/// - `0 <= reserved_quantity <= quantity`
/// - `min_stock_level >= 0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosition {
    pub(crate) variant_id: VariantId,
    pub(crate) warehouse_id: WarehouseId,
    pub(crate) quantity: i64,
    pub(crate) reserved_quantity: i64,
    pub(crate) min_stock_level: i64,
}

impl StockPosition {
    pub(crate) fn empty(variant_id: VariantId, warehouse_id: WarehouseId) -> Self {
        Self {
            variant_id,
            warehouse_id,
            quantity: 0,
            reserved_quantity: 0,
            min_stock_level: 0,
        }
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved_quantity(&self) -> i64 {
        self.reserved_quantity
    }

    pub fn min_stock_level(&self) -> i64 {
        self.min_stock_level
    }

    /// Stock not held by any reservation.
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }

    /// Whether the position has fallen below its configured floor.
    pub fn is_below_min_level(&self) -> bool {
        self.quantity < self.min_stock_level
    }

    pub fn snapshot(&self) -> StockSnapshot {
        StockSnapshot {
            variant_id: self.variant_id,
            warehouse_id: self.warehouse_id,
            quantity: self.quantity,
            reserved_quantity: self.reserved_quantity,
            min_stock_level: self.min_stock_level,
        }
    }
}

/// Point-in-time copy of one position's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub min_stock_level: i64,
}

impl ValueObject for StockSnapshot {}

/// Before/after snapshot pair returned by every mutating ledger operation.
///
/// Callers use it to build audit records and adjustment summaries without
/// re-reading the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMutation {
    pub before: StockSnapshot,
    pub after: StockSnapshot,
}

impl StockMutation {
    pub fn variant_id(&self) -> VariantId {
        self.after.variant_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.after.warehouse_id
    }

    /// Signed quantity change of this mutation.
    pub fn quantity_delta(&self) -> i64 {
        self.after.quantity - self.before.quantity
    }
}

impl ValueObject for StockMutation {}

/// Per-warehouse before/after pair inside a [`VariantAdjustment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseAdjustment {
    pub warehouse_id: WarehouseId,
    pub quantity_before: i64,
    pub quantity_after: i64,
}

/// Aggregated stock change for one variant across every warehouse a command
/// touched. `quantity` is the signed net change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAdjustment {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub warehouses: Vec<WarehouseAdjustment>,
}

impl ValueObject for VariantAdjustment {}

/// Fold a command's mutations into one summary per distinct variant.
///
/// Merging rule per (variant, warehouse): keep the first `before`, take the
/// last `after`, sum the deltas. First-seen order is preserved on both
/// levels so event payloads are deterministic.
pub fn summarize_adjustments(mutations: &[StockMutation]) -> Vec<VariantAdjustment> {
    let mut summaries: Vec<VariantAdjustment> = Vec::new();

    for mutation in mutations {
        let variant_id = mutation.variant_id();
        let idx = match summaries.iter().position(|s| s.variant_id == variant_id) {
            Some(idx) => idx,
            None => {
                summaries.push(VariantAdjustment {
                    variant_id,
                    quantity: 0,
                    warehouses: Vec::new(),
                });
                summaries.len() - 1
            }
        };

        let summary = &mut summaries[idx];
        summary.quantity += mutation.quantity_delta();

        let warehouse_id = mutation.warehouse_id();
        match summary
            .warehouses
            .iter_mut()
            .find(|w| w.warehouse_id == warehouse_id)
        {
            Some(existing) => existing.quantity_after = mutation.after.quantity,
            None => summary.warehouses.push(WarehouseAdjustment {
                warehouse_id,
                quantity_before: mutation.before.quantity,
                quantity_after: mutation.after.quantity,
            }),
        }
    }

    summaries
}
