use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, DomainError, DomainResult, TenantId};
use stockflow_events::Event;
use stockflow_inventory::{
    AllocationId, AllocationPlanner, AllocationStatus, InventoryLedger, StockMutation,
    TransactionReference, VariantAdjustment, VariantId, WarehouseId, summarize_adjustments,
};
use stockflow_parties::PartyId;

use crate::order::{
    SalesOrder, SalesOrderId, SalesOrderLine, SalesOrderLineId, SalesOrderStatus,
};

/// Requested order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub variant_id: VariantId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    /// Optional per-unit discount in smallest currency unit.
    pub discount: Option<u64>,
}

/// Command: CreateSalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer_id: PartyId,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// One allocation payload entry accompanying a ship/deliver transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// Command: UpdateSalesOrderStatus.
///
/// `allocations` is required (non-empty) for a `Shipped` target and is how
/// successive partial shipments are expressed against an order that is
/// already `Shipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSalesOrderStatus {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub target: SalesOrderStatus,
    pub allocations: Option<Vec<AllocationRequest>>,
    pub occurred_at: DateTime<Utc>,
}

/// Exact-allocation fulfillment entry used by the shipment path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFulfillment {
    pub line_id: SalesOrderLineId,
    pub allocation_id: AllocationId,
    pub quantity: i64,
}

/// Event: SalesOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer_id: PartyId,
    pub total_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalesOrderStatusChanged.
///
/// `adjustments` carries the per-variant stock summary when the transition
/// consumed allocations (ship/deliver); empty otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderStatusChanged {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub from: SalesOrderStatus,
    pub to: SalesOrderStatus,
    pub adjustments: Vec<VariantAdjustment>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderEvent {
    Created(SalesOrderCreated),
    StatusChanged(SalesOrderStatusChanged),
}

impl Event for SalesOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesOrderEvent::Created(_) => "sales.order.created",
            SalesOrderEvent::StatusChanged(_) => "sales.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesOrderEvent::Created(e) => e.occurred_at,
            SalesOrderEvent::StatusChanged(e) => e.occurred_at,
        }
    }
}

/// Sales-order status machine and fulfillment logic.
///
/// Stateless; aggregates and the ledger are threaded explicitly so one
/// command's mutations commit or roll back together at the transactional
/// boundary.
pub struct SalesFulfillmentEngine;

impl SalesFulfillmentEngine {
    /// Create an order, reserving stock for every line.
    ///
    /// A reservation shortfall on any line aborts the whole order; the
    /// caller discards the mutated ledger.
    pub fn create_order(
        ledger: &mut InventoryLedger,
        cmd: &CreateSalesOrder,
    ) -> DomainResult<(SalesOrder, Vec<SalesOrderEvent>)> {
        if cmd.lines.is_empty() {
            return Err(DomainError::invalid_argument(
                "a sales order requires at least one line",
            ));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        let mut total_amount: u64 = 0;

        for requested in &cmd.lines {
            if requested.quantity <= 0 {
                return Err(DomainError::invalid_argument("quantity must be positive"));
            }
            let discount = requested.discount.unwrap_or(0);
            if discount > requested.unit_price {
                return Err(DomainError::invalid_argument(format!(
                    "discount {discount} exceeds unit price {}",
                    requested.unit_price
                )));
            }

            let allocations = AllocationPlanner::reserve(
                ledger,
                requested.variant_id,
                requested.quantity,
                cmd.occurred_at,
            )?;

            let line = SalesOrderLine {
                id: SalesOrderLineId::new(AggregateId::new()),
                variant_id: requested.variant_id,
                quantity: requested.quantity,
                unit_price: requested.unit_price,
                discount,
                allocations,
            };
            total_amount += line.line_total();
            lines.push(line);
        }

        let order = SalesOrder {
            id: cmd.order_id,
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            status: SalesOrderStatus::Pending,
            lines,
            total_amount,
            created_at: cmd.occurred_at,
            version: 1,
        };

        let events = vec![SalesOrderEvent::Created(SalesOrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            total_amount,
            occurred_at: cmd.occurred_at,
        })];

        Ok((order, events))
    }

    /// Drive the order status machine.
    ///
    /// Returns the per-variant adjustment summary (non-empty only when the
    /// transition consumed allocations) and the domain events to publish
    /// after commit.
    pub fn update_status(
        order: &mut SalesOrder,
        ledger: &mut InventoryLedger,
        cmd: &UpdateSalesOrderStatus,
    ) -> DomainResult<(Vec<VariantAdjustment>, Vec<SalesOrderEvent>)> {
        ensure_tenant(order, cmd.tenant_id)?;

        let current = order.status;
        let target = cmd.target;
        let payload: &[AllocationRequest] = cmd.allocations.as_deref().unwrap_or(&[]);
        let has_payload = !payload.is_empty();

        // Same-state requests are rejected, except the partial-shipment
        // idiom: ship/deliver again with a fresh allocations payload.
        let partial_shipment_target =
            matches!(target, SalesOrderStatus::Shipped | SalesOrderStatus::Delivered);
        if current == target && !(has_payload && partial_shipment_target) {
            return Err(DomainError::already_in_status(current));
        }

        let mut mutations: Vec<StockMutation> = Vec::new();

        match target {
            SalesOrderStatus::Confirmed => {
                if current != SalesOrderStatus::Pending {
                    return Err(DomainError::invalid_transition(current, target));
                }
                order.status = SalesOrderStatus::Confirmed;
            }
            SalesOrderStatus::Shipped => {
                if !matches!(
                    current,
                    SalesOrderStatus::Pending
                        | SalesOrderStatus::Confirmed
                        | SalesOrderStatus::Shipped
                ) {
                    return Err(DomainError::invalid_transition(current, target));
                }
                if !has_payload {
                    return Err(DomainError::invalid_argument(
                        "an allocations payload is required to ship",
                    ));
                }
                for entry in payload {
                    mutations.push(fulfill_matching_allocation(order, ledger, entry, cmd.occurred_at)?);
                }
                order.status = SalesOrderStatus::Shipped;
            }
            SalesOrderStatus::Delivered => {
                if !matches!(
                    current,
                    SalesOrderStatus::Confirmed
                        | SalesOrderStatus::Shipped
                        | SalesOrderStatus::Delivered
                ) {
                    return Err(DomainError::invalid_transition(current, target));
                }
                for entry in payload {
                    mutations.push(fulfill_matching_allocation(order, ledger, entry, cmd.occurred_at)?);
                }
                // Direct delivery is only valid once the goods actually
                // shipped, i.e. every allocation is fully fulfilled.
                if !order.all_allocations_fulfilled() {
                    return Err(DomainError::InvalidTransition(format!(
                        "cannot transition from {current} to {target}: unfulfilled allocations remain"
                    )));
                }
                mark_fulfilled_allocations_delivered(order);
                order.status = SalesOrderStatus::Delivered;
            }
            SalesOrderStatus::Cancelled => {
                if !matches!(
                    current,
                    SalesOrderStatus::Pending | SalesOrderStatus::Confirmed
                ) {
                    return Err(DomainError::invalid_transition(current, target));
                }
                release_reserved_allocations(order, ledger, cmd.occurred_at)?;
                order.status = SalesOrderStatus::Cancelled;
            }
            SalesOrderStatus::Pending => {
                return Err(DomainError::invalid_transition(current, target));
            }
        }

        order.touch();

        let adjustments = summarize_adjustments(&mutations);
        let events = vec![SalesOrderEvent::StatusChanged(SalesOrderStatusChanged {
            tenant_id: order.tenant_id,
            order_id: order.id,
            from: current,
            to: order.status,
            adjustments: adjustments.clone(),
            occurred_at: cmd.occurred_at,
        })];

        Ok((adjustments, events))
    }

    /// Fulfill exact allocations on behalf of a shipment and apply the
    /// `Shipped` transition. Ledger decrements carry the shipment reference.
    pub fn ship_lines(
        order: &mut SalesOrder,
        ledger: &mut InventoryLedger,
        shipment_reference: TransactionReference,
        entries: &[LineFulfillment],
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<(Vec<VariantAdjustment>, Vec<SalesOrderEvent>)> {
        if entries.is_empty() {
            return Err(DomainError::invalid_argument(
                "a shipment requires at least one line",
            ));
        }

        let current = order.status;
        if !matches!(
            current,
            SalesOrderStatus::Pending | SalesOrderStatus::Confirmed | SalesOrderStatus::Shipped
        ) {
            return Err(DomainError::invalid_transition(current, SalesOrderStatus::Shipped));
        }

        let mut mutations = Vec::with_capacity(entries.len());
        for entry in entries {
            mutations.push(fulfill_exact_allocation(
                order,
                ledger,
                entry,
                shipment_reference,
                occurred_at,
            )?);
        }

        order.status = SalesOrderStatus::Shipped;
        order.touch();

        let adjustments = summarize_adjustments(&mutations);
        let events = vec![SalesOrderEvent::StatusChanged(SalesOrderStatusChanged {
            tenant_id: order.tenant_id,
            order_id: order.id,
            from: current,
            to: SalesOrderStatus::Shipped,
            adjustments: adjustments.clone(),
            occurred_at,
        })];

        Ok((adjustments, events))
    }
}

fn ensure_tenant(order: &SalesOrder, tenant_id: TenantId) -> DomainResult<()> {
    if order.tenant_id != tenant_id {
        return Err(DomainError::conflict("tenant mismatch"));
    }
    Ok(())
}

/// Locate the line + allocation matching a payload entry and consume it:
/// fulfill the reservation, decrement the ledger (stock physically leaves
/// at ship time), return the mutation for summary folding.
fn fulfill_matching_allocation(
    order: &mut SalesOrder,
    ledger: &mut InventoryLedger,
    entry: &AllocationRequest,
    occurred_at: DateTime<Utc>,
) -> DomainResult<StockMutation> {
    if entry.quantity <= 0 {
        return Err(DomainError::invalid_argument("quantity must be positive"));
    }

    let mut matched: Option<(usize, usize)> = None;
    let mut best_short: Option<i64> = None;

    'lines: for (line_idx, line) in order.lines.iter().enumerate() {
        if line.variant_id != entry.variant_id {
            continue;
        }
        for (alloc_idx, allocation) in line.allocations.iter().enumerate() {
            if allocation.warehouse_id() != entry.warehouse_id {
                continue;
            }
            if allocation.status() == AllocationStatus::Reserved
                && allocation.remaining() >= entry.quantity
            {
                matched = Some((line_idx, alloc_idx));
                break 'lines;
            }
            best_short = Some(best_short.map_or(allocation.remaining(), |b| b.max(allocation.remaining())));
        }
    }

    let (line_idx, alloc_idx) = match matched {
        Some(found) => found,
        None => {
            return Err(match best_short {
                Some(remaining) => DomainError::invalid_argument(format!(
                    "quantity {} exceeds unfulfilled allocation balance {remaining} for variant {} in warehouse {}",
                    entry.quantity, entry.variant_id, entry.warehouse_id
                )),
                None => DomainError::not_found(format!(
                    "no allocation for variant {} in warehouse {}",
                    entry.variant_id, entry.warehouse_id
                )),
            });
        }
    };

    let order_reference = TransactionReference::sales_order(order.id.0);
    let allocation = &mut order.lines[line_idx].allocations[alloc_idx];
    AllocationPlanner::fulfill(ledger, allocation, entry.quantity)?;
    ledger.decrease(
        entry.variant_id,
        entry.warehouse_id,
        entry.quantity,
        Some(order_reference),
        None,
        occurred_at,
    )
}

/// Consume a specific allocation by id (shipment-driven fulfillment).
fn fulfill_exact_allocation(
    order: &mut SalesOrder,
    ledger: &mut InventoryLedger,
    entry: &LineFulfillment,
    reference: TransactionReference,
    occurred_at: DateTime<Utc>,
) -> DomainResult<StockMutation> {
    let line_idx = order
        .lines
        .iter()
        .position(|l| l.id == entry.line_id)
        .ok_or_else(|| DomainError::not_found(format!("sales order line {}", entry.line_id)))?;
    let alloc_idx = order.lines[line_idx]
        .allocations
        .iter()
        .position(|a| a.id_typed() == entry.allocation_id)
        .ok_or_else(|| DomainError::not_found(format!("allocation {}", entry.allocation_id)))?;

    let allocation = &mut order.lines[line_idx].allocations[alloc_idx];
    let variant_id = allocation.variant_id();
    let warehouse_id = allocation.warehouse_id();

    AllocationPlanner::fulfill(ledger, allocation, entry.quantity)?;
    ledger.decrease(
        variant_id,
        warehouse_id,
        entry.quantity,
        Some(reference),
        None,
        occurred_at,
    )
}

fn release_reserved_allocations(
    order: &mut SalesOrder,
    ledger: &mut InventoryLedger,
    now: DateTime<Utc>,
) -> DomainResult<()> {
    for line in &mut order.lines {
        for allocation in &mut line.allocations {
            if allocation.status() == AllocationStatus::Reserved {
                AllocationPlanner::release(ledger, allocation, now)?;
            }
        }
    }
    Ok(())
}

fn mark_fulfilled_allocations_delivered(order: &mut SalesOrder) {
    for line in &mut order.lines {
        for allocation in &mut line.allocations {
            allocation.mark_delivered();
        }
    }
}
