use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::TenantId;
use stockflow_events::Event;

use crate::stock::{VariantAdjustment, VariantId, WarehouseId};
use crate::transaction::{TransactionKind, TransactionReference};

/// Event: StockAdjusted.
///
/// Emitted once per committed adjustment command, carrying the folded
/// per-variant summary rather than raw mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub kind: TransactionKind,
    pub adjustments: Vec<VariantAdjustment>,
    pub reference: Option<TransactionReference>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MinStockLevelUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinStockLevelUpdated {
    pub tenant_id: TenantId,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockAdjusted(StockAdjusted),
    MinStockLevelUpdated(MinStockLevelUpdated),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockAdjusted(_) => "inventory.stock.adjusted",
            InventoryEvent::MinStockLevelUpdated(_) => "inventory.stock.min_level_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::MinStockLevelUpdated(e) => e.occurred_at,
        }
    }
}
