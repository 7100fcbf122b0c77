use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::AggregateId;

use crate::stock::{VariantId, WarehouseId};

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Stock entering a warehouse (receiving, manual intake).
    In,
    /// Stock leaving a warehouse (shipping, manual removal).
    Out,
    /// Absolute correction of a position's quantity.
    Adjust,
    /// Relocation between two warehouses; recorded as a debit/credit pair.
    Move,
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            TransactionKind::In => "in",
            TransactionKind::Out => "out",
            TransactionKind::Adjust => "adjust",
            TransactionKind::Move => "move",
        };
        f.write_str(name)
    }
}

/// What kind of document a transaction traces back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    PurchaseOrder,
    SalesOrder,
    Shipment,
}

/// Link from a ledger transaction to the document that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReference {
    pub kind: ReferenceType,
    pub id: AggregateId,
}

impl TransactionReference {
    pub fn purchase_order(id: AggregateId) -> Self {
        Self {
            kind: ReferenceType::PurchaseOrder,
            id,
        }
    }

    pub fn sales_order(id: AggregateId) -> Self {
        Self {
            kind: ReferenceType::SalesOrder,
            id,
        }
    }

    pub fn shipment(id: AggregateId) -> Self {
        Self {
            kind: ReferenceType::Shipment,
            id,
        }
    }
}

/// One immutable entry in the stock movement log.
///
/// Append-only: entries are never updated or deleted. `quantity` is the
/// signed delta applied to the position (`In` rows are positive, `Out` rows
/// negative, `Adjust` rows carry `after - before`, `Move` records a
/// negative row at the source and a positive row at the destination), so
/// summing a position's entries reconciles to its current quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub transaction_id: Uuid,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub kind: TransactionKind,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub reference: Option<TransactionReference>,
    pub notes: Option<String>,
}
