use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, AggregateRoot, TenantId};
use stockflow_inventory::{AllocationId, WarehouseId};
use stockflow_sales::{SalesOrderId, SalesOrderLineId};

/// Shipment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(pub AggregateId);

impl ShipmentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Carrier identifier (the carrier directory is outside the core).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CarrierId(pub AggregateId);

impl CarrierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CarrierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Shipment status lifecycle.
///
/// `Created` is initial; `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentStatus {
    Created,
    InTransit,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ShipmentStatus::Delivered | ShipmentStatus::Cancelled)
    }
}

impl core::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ShipmentStatus::Created => "created",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One shipped portion of a sales-order line, pinned to the allocation it
/// consumes. Its quantity was bounded by that allocation's unfulfilled
/// remainder at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentLine {
    pub sales_order_line_id: SalesOrderLineId,
    pub allocation_id: AllocationId,
    pub quantity: i64,
    /// Gross weight in grams, when the carrier needs it.
    pub weight: Option<u32>,
}

/// Append-only tracking entry, purely observational.
///
/// Never deduplicated: recording the same payload twice appends two entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub status: ShipmentStatus,
    pub location: Option<String>,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
}

/// Aggregate root: Shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub(crate) id: ShipmentId,
    pub(crate) tenant_id: TenantId,
    pub(crate) sales_order_id: SalesOrderId,
    pub(crate) warehouse_id: WarehouseId,
    pub(crate) carrier_id: Option<CarrierId>,
    pub(crate) status: ShipmentStatus,
    pub(crate) lines: Vec<ShipmentLine>,
    pub(crate) events: Vec<ShipmentEvent>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) delivered_at: Option<DateTime<Utc>>,
    pub(crate) version: u64,
}

impl Shipment {
    pub fn id_typed(&self) -> ShipmentId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn sales_order_id(&self) -> SalesOrderId {
        self.sales_order_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn carrier_id(&self) -> Option<CarrierId> {
        self.carrier_id
    }

    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    pub fn lines(&self) -> &[ShipmentLine] {
        &self.lines
    }

    /// The tracking log, in append order.
    pub fn events(&self) -> &[ShipmentEvent] {
        &self.events
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// Force a non-terminal shipment to `Delivered`.
    ///
    /// Used when the parent order is delivered through the direct status
    /// command and its remaining shipments are swept along. No-op on
    /// terminal shipments.
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) {
        if !self.status.is_terminal() {
            self.status = ShipmentStatus::Delivered;
            self.delivered_at = Some(at);
            self.version += 1;
        }
    }
}

impl AggregateRoot for Shipment {
    type Id = ShipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
