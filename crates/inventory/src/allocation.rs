use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, DomainError, DomainResult, Entity};

use crate::ledger::InventoryLedger;
use crate::stock::{VariantId, WarehouseId};

/// Allocation identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(pub AggregateId);

impl AllocationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Allocation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Reserved,
    Delivered,
    Released,
}

impl core::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            AllocationStatus::Reserved => "reserved",
            AllocationStatus::Delivered => "delivered",
            AllocationStatus::Released => "released",
        };
        f.write_str(name)
    }
}

/// A reservation of stock for one sales-order line against one warehouse.
///
/// `fulfilled_quantity` grows as shipments consume the reservation;
/// `fulfilled_quantity <= quantity` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    id: AllocationId,
    variant_id: VariantId,
    warehouse_id: WarehouseId,
    quantity: i64,
    fulfilled_quantity: i64,
    status: AllocationStatus,
    reserved_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
}

impl Allocation {
    pub(crate) fn reserved(
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reserved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AllocationId::new(AggregateId::new()),
            variant_id,
            warehouse_id,
            quantity,
            fulfilled_quantity: 0,
            status: AllocationStatus::Reserved,
            reserved_at,
            released_at: None,
        }
    }

    /// Build a fully-delivered allocation for an order recorded after the
    /// goods already moved (the manual-adjustment path). Does not touch the
    /// ledger.
    pub fn already_delivered(
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::invalid_argument("quantity must be positive"));
        }

        Ok(Self {
            id: AllocationId::new(AggregateId::new()),
            variant_id,
            warehouse_id,
            quantity,
            fulfilled_quantity: quantity,
            status: AllocationStatus::Delivered,
            reserved_at: at,
            released_at: None,
        })
    }

    pub fn id_typed(&self) -> AllocationId {
        self.id
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

    pub fn fulfilled_quantity(&self) -> i64 {
        self.fulfilled_quantity
    }

    pub fn status(&self) -> AllocationStatus {
        self.status
    }

    pub fn reserved_at(&self) -> DateTime<Utc> {
        self.reserved_at
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.released_at
    }

    /// Units reserved but not yet fulfilled.
    pub fn remaining(&self) -> i64 {
        self.quantity - self.fulfilled_quantity
    }

    pub fn is_fully_fulfilled(&self) -> bool {
        self.fulfilled_quantity == self.quantity
    }

    /// Flip a fully-fulfilled allocation to `Delivered`.
    ///
    /// Idempotent; a partially-fulfilled allocation stays `Reserved` (its
    /// remainder is still held for future shipments).
    pub fn mark_delivered(&mut self) {
        if self.is_fully_fulfilled() && self.status == AllocationStatus::Reserved {
            self.status = AllocationStatus::Delivered;
        }
    }
}

impl Entity for Allocation {
    type Id = AllocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Greedy cross-warehouse reservation of scarce stock.
///
/// Stateless; every method threads the ledger explicitly so a command's
/// mutations stay inside one transactional unit.
pub struct AllocationPlanner;

impl AllocationPlanner {
    /// Reserve `quantity` units of a variant across warehouses.
    ///
    /// Warehouses are drained in descending-available order, ties broken by
    /// ascending warehouse id. All-or-nothing: a shortfall fails before any
    /// counter is touched, so no partial reservation can ever survive.
    pub fn reserve(
        ledger: &mut InventoryLedger,
        variant_id: VariantId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Allocation>> {
        if quantity <= 0 {
            return Err(DomainError::invalid_argument("quantity must be positive"));
        }

        let mut positions: Vec<(WarehouseId, i64)> = ledger
            .positions_for_variant(variant_id)
            .into_iter()
            .filter(|p| p.available() > 0)
            .map(|p| (p.warehouse_id(), p.available()))
            .collect();
        positions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let total_available: i64 = positions.iter().map(|(_, available)| available).sum();
        if total_available < quantity {
            return Err(DomainError::insufficient_stock(quantity, total_available));
        }

        let mut plan: Vec<(WarehouseId, i64)> = Vec::new();
        let mut remaining = quantity;
        for (warehouse_id, available) in positions {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(available);
            plan.push((warehouse_id, take));
            remaining -= take;
        }

        let mut allocations = Vec::with_capacity(plan.len());
        for (warehouse_id, take) in plan {
            ledger.reserve_stock(variant_id, warehouse_id, take)?;
            allocations.push(Allocation::reserved(variant_id, warehouse_id, take, now));
        }

        Ok(allocations)
    }

    /// Give back the still-reserved remainder of an allocation and mark it
    /// `Released`. Used on order cancellation.
    pub fn release(
        ledger: &mut InventoryLedger,
        allocation: &mut Allocation,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if allocation.status != AllocationStatus::Reserved {
            return Err(DomainError::invalid_transition(
                format!("allocation in status {}", allocation.status),
                AllocationStatus::Released,
            ));
        }

        let remainder = allocation.remaining();
        if remainder > 0 {
            ledger.release_stock(allocation.variant_id, allocation.warehouse_id, remainder)?;
        }

        allocation.status = AllocationStatus::Released;
        allocation.released_at = Some(now);
        Ok(())
    }

    /// Convert `qty` units of a reservation into fulfillment.
    ///
    /// Drops the position's reservation by `qty`; the caller pairs this with
    /// [`InventoryLedger::decrease`] so the stock physically leaves and the
    /// movement is logged. Marks the allocation `Delivered` once fully
    /// fulfilled.
    pub fn fulfill(
        ledger: &mut InventoryLedger,
        allocation: &mut Allocation,
        qty: i64,
    ) -> DomainResult<()> {
        if qty <= 0 {
            return Err(DomainError::invalid_argument("quantity must be positive"));
        }
        if allocation.status != AllocationStatus::Reserved {
            return Err(DomainError::invalid_transition(
                format!("allocation in status {}", allocation.status),
                AllocationStatus::Delivered,
            ));
        }
        if qty > allocation.remaining() {
            return Err(DomainError::invalid_argument(format!(
                "quantity {qty} exceeds unfulfilled allocation balance {}",
                allocation.remaining()
            )));
        }

        ledger.release_stock(allocation.variant_id, allocation.warehouse_id, qty)?;
        allocation.fulfilled_quantity += qty;
        if allocation.is_fully_fulfilled() {
            allocation.status = AllocationStatus::Delivered;
        }

        Ok(())
    }
}
