use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, TenantId};
use stockflow_events::Event;
use stockflow_inventory::{
    InventoryLedger, StockMutation, TransactionReference, VariantAdjustment, VariantId,
    WarehouseId, summarize_adjustments,
};
use stockflow_parties::PartyId;

use crate::order::{PurchaseOrder, PurchaseOrderId, PurchaseOrderLine, PurchaseOrderStatus};

/// Requested purchase line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseLine {
    pub variant_id: VariantId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: PartyId,
    pub lines: Vec<NewPurchaseLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePurchaseOrderStatus.
///
/// `warehouse_id` is required when the target is `Received`; it names where
/// the goods are booked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePurchaseOrderStatus {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub target: PurchaseOrderStatus,
    pub warehouse_id: Option<WarehouseId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderStatusChanged.
///
/// `adjustments` carries the per-variant stock summary when the transition
/// booked goods in (receive); empty otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderStatusChanged {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub adjustments: Vec<VariantAdjustment>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    Created(PurchaseOrderCreated),
    StatusChanged(PurchaseOrderStatusChanged),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::Created(_) => "purchasing.order.created",
            PurchaseOrderEvent::StatusChanged(_) => "purchasing.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::Created(e) => e.occurred_at,
            PurchaseOrderEvent::StatusChanged(e) => e.occurred_at,
        }
    }
}

/// Purchase-order status machine and goods receiving.
pub struct PurchaseReceivingEngine;

impl PurchaseReceivingEngine {
    pub fn create_order(
        cmd: &CreatePurchaseOrder,
    ) -> DomainResult<(PurchaseOrder, Vec<PurchaseOrderEvent>)> {
        if cmd.lines.is_empty() {
            return Err(DomainError::invalid_argument(
                "a purchase order requires at least one line",
            ));
        }
        if cmd.lines.iter().any(|l| l.quantity <= 0) {
            return Err(DomainError::invalid_argument("quantity must be positive"));
        }

        let lines = cmd
            .lines
            .iter()
            .map(|l| PurchaseOrderLine {
                variant_id: l.variant_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
            .collect();

        let order = PurchaseOrder {
            id: cmd.order_id,
            tenant_id: cmd.tenant_id,
            supplier_id: cmd.supplier_id,
            status: PurchaseOrderStatus::Pending,
            lines,
            created_at: cmd.occurred_at,
            version: 1,
        };

        let events = vec![PurchaseOrderEvent::Created(PurchaseOrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            supplier_id: cmd.supplier_id,
            occurred_at: cmd.occurred_at,
        })];

        Ok((order, events))
    }

    /// Drive the purchase-order status machine.
    ///
    /// Receiving books every line into the named warehouse through the
    /// ledger and folds one adjustment summary per distinct variant.
    pub fn update_status(
        order: &mut PurchaseOrder,
        ledger: &mut InventoryLedger,
        cmd: &UpdatePurchaseOrderStatus,
    ) -> DomainResult<(Vec<VariantAdjustment>, Vec<PurchaseOrderEvent>)> {
        if order.tenant_id != cmd.tenant_id {
            return Err(DomainError::conflict("tenant mismatch"));
        }

        let current = order.status;
        let target = cmd.target;

        if current == target {
            return Err(DomainError::already_in_status(current));
        }

        let mut mutations: Vec<StockMutation> = Vec::new();

        match target {
            PurchaseOrderStatus::Ordered => {
                if current != PurchaseOrderStatus::Pending {
                    return Err(DomainError::invalid_transition(current, target));
                }
                order.status = PurchaseOrderStatus::Ordered;
            }
            PurchaseOrderStatus::Received => {
                if current != PurchaseOrderStatus::Ordered {
                    return Err(DomainError::invalid_transition(current, target));
                }
                let warehouse_id = cmd.warehouse_id.ok_or_else(|| {
                    DomainError::invalid_argument("a warehouse is required to receive goods")
                })?;

                let reference = TransactionReference::purchase_order(order.id.0);
                for line in &order.lines {
                    mutations.push(ledger.increase(
                        line.variant_id,
                        warehouse_id,
                        line.quantity,
                        Some(reference),
                        None,
                        cmd.occurred_at,
                    )?);
                }
                order.status = PurchaseOrderStatus::Received;
            }
            PurchaseOrderStatus::Cancelled => {
                if !matches!(
                    current,
                    PurchaseOrderStatus::Pending | PurchaseOrderStatus::Ordered
                ) {
                    return Err(DomainError::invalid_transition(current, target));
                }
                order.status = PurchaseOrderStatus::Cancelled;
            }
            PurchaseOrderStatus::Pending => {
                return Err(DomainError::invalid_transition(current, target));
            }
        }

        order.touch();

        let adjustments = summarize_adjustments(&mutations);
        let events = vec![PurchaseOrderEvent::StatusChanged(PurchaseOrderStatusChanged {
            tenant_id: order.tenant_id,
            order_id: order.id,
            from: current,
            to: order.status,
            adjustments: adjustments.clone(),
            occurred_at: cmd.occurred_at,
        })];

        Ok((adjustments, events))
    }
}
