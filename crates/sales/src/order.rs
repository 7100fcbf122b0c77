use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, AggregateRoot, DomainError, DomainResult, Entity, TenantId};
use stockflow_inventory::{Allocation, VariantId, WarehouseId};
use stockflow_parties::PartyId;

/// Sales order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesOrderId(pub AggregateId);

impl SalesOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sales order line identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesOrderLineId(pub AggregateId);

impl SalesOrderLineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesOrderLineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sales order status lifecycle.
///
/// `Pending` is initial; `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesOrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl SalesOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SalesOrderStatus::Delivered | SalesOrderStatus::Cancelled)
    }
}

impl core::fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            SalesOrderStatus::Pending => "pending",
            SalesOrderStatus::Confirmed => "confirmed",
            SalesOrderStatus::Shipped => "shipped",
            SalesOrderStatus::Delivered => "delivered",
            SalesOrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Order line: variant, quantity, pricing, and the allocations backing it.
///
/// Once fully reserved, the sum of allocation quantities equals the ordered
/// quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderLine {
    pub(crate) id: SalesOrderLineId,
    pub(crate) variant_id: VariantId,
    pub(crate) quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub(crate) unit_price: u64,
    /// Per-unit discount in smallest currency unit.
    pub(crate) discount: u64,
    pub(crate) allocations: Vec<Allocation>,
}

impl SalesOrderLine {
    pub fn id_typed(&self) -> SalesOrderLineId {
        self.id
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn discount(&self) -> u64 {
        self.discount
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Per-unit price after discount.
    pub fn effective_unit_price(&self) -> u64 {
        self.unit_price - self.discount
    }

    /// Line total in smallest currency unit.
    pub fn line_total(&self) -> u64 {
        (self.quantity as u64) * self.effective_unit_price()
    }
}

impl Entity for SalesOrderLine {
    type Id = SalesOrderLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub(crate) id: SalesOrderId,
    pub(crate) tenant_id: TenantId,
    pub(crate) customer_id: PartyId,
    pub(crate) status: SalesOrderStatus,
    pub(crate) lines: Vec<SalesOrderLine>,
    pub(crate) total_amount: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) version: u64,
}

impl SalesOrder {
    /// Build an order that is already delivered, for a stock movement
    /// recorded after the fact (the manual-adjustment path). The single line
    /// carries a fully-delivered allocation; the ledger is untouched.
    pub fn new_delivered(
        id: SalesOrderId,
        tenant_id: TenantId,
        customer_id: PartyId,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        quantity: i64,
        unit_price: u64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::invalid_argument("quantity must be positive"));
        }

        let allocation =
            Allocation::already_delivered(variant_id, warehouse_id, quantity, occurred_at)?;
        let line = SalesOrderLine {
            id: SalesOrderLineId::new(AggregateId::new()),
            variant_id,
            quantity,
            unit_price,
            discount: 0,
            allocations: vec![allocation],
        };
        let total_amount = line.line_total();

        Ok(Self {
            id,
            tenant_id,
            customer_id,
            status: SalesOrderStatus::Delivered,
            lines: vec![line],
            total_amount,
            created_at: occurred_at,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn customer_id(&self) -> PartyId {
        self.customer_id
    }

    pub fn status(&self) -> SalesOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[SalesOrderLine] {
        &self.lines
    }

    pub fn line(&self, line_id: SalesOrderLineId) -> Option<&SalesOrderLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    /// Total in smallest currency unit.
    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether every allocation on the order has been fully fulfilled.
    pub fn all_allocations_fulfilled(&self) -> bool {
        self.lines
            .iter()
            .flat_map(|l| l.allocations.iter())
            .all(Allocation::is_fully_fulfilled)
    }

    /// Whether every allocation on the order has reached `Delivered`.
    pub fn all_allocations_delivered(&self) -> bool {
        self.lines.iter().flat_map(|l| l.allocations.iter()).all(|a| {
            matches!(
                a.status(),
                stockflow_inventory::AllocationStatus::Delivered
            )
        })
    }

    /// Mutable access to one allocation, addressed by line + allocation id.
    ///
    /// Used by the shipment path to mark delivered allocations; reservation
    /// and fulfillment always go through the planner.
    pub fn allocation_mut(
        &mut self,
        line_id: SalesOrderLineId,
        allocation_id: stockflow_inventory::AllocationId,
    ) -> Option<&mut Allocation> {
        self.lines
            .iter_mut()
            .find(|l| l.id == line_id)?
            .allocations
            .iter_mut()
            .find(|a| a.id_typed() == allocation_id)
    }

    /// Flip the order to `Delivered` once every allocation has been
    /// delivered. This is the shipment-driven delivery path; the direct
    /// status command goes through the fulfillment engine instead.
    pub fn complete_delivery(&mut self) -> DomainResult<()> {
        if !self.all_allocations_delivered() {
            return Err(DomainError::InvalidTransition(format!(
                "cannot transition from {} to delivered: undelivered allocations remain",
                self.status
            )));
        }
        self.status = SalesOrderStatus::Delivered;
        self.version += 1;
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
