use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, TenantId};
use stockflow_events::Event;
use stockflow_inventory::{
    AllocationStatus, InventoryLedger, TransactionReference, VariantAdjustment,
};
use stockflow_sales::{
    LineFulfillment, SalesFulfillmentEngine, SalesOrder, SalesOrderEvent, SalesOrderId,
    SalesOrderLineId, SalesOrderStatus, SalesOrderStatusChanged,
};

use crate::shipment::{
    CarrierId, Shipment, ShipmentEvent, ShipmentId, ShipmentLine, ShipmentStatus,
};
use stockflow_inventory::WarehouseId;

/// Requested shipment line. The allocation is resolved from the referenced
/// order line at the shipment's warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShipmentLine {
    pub sales_order_line_id: SalesOrderLineId,
    pub quantity: i64,
    pub weight: Option<u32>,
}

/// Command: CreateShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShipment {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentId,
    pub sales_order_id: SalesOrderId,
    pub warehouse_id: WarehouseId,
    pub carrier_id: Option<CarrierId>,
    pub lines: Vec<NewShipmentLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordShipmentEvent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordShipmentEvent {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentId,
    pub status: ShipmentStatus,
    pub event_date: DateTime<Utc>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Command: UpdateShipmentStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateShipmentStatus {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentId,
    pub target: ShipmentStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCreated {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentId,
    pub sales_order_id: SalesOrderId,
    pub adjustments: Vec<VariantAdjustment>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentStatusChanged {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentId,
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentEventRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentEventRecorded {
    pub tenant_id: TenantId,
    pub shipment_id: ShipmentId,
    pub status: ShipmentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShippingEvent {
    Created(ShipmentCreated),
    StatusChanged(ShipmentStatusChanged),
    EventRecorded(ShipmentEventRecorded),
}

impl Event for ShippingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShippingEvent::Created(_) => "shipping.shipment.created",
            ShippingEvent::StatusChanged(_) => "shipping.shipment.status_changed",
            ShippingEvent::EventRecorded(_) => "shipping.shipment.event_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShippingEvent::Created(e) => e.occurred_at,
            ShippingEvent::StatusChanged(e) => e.occurred_at,
            ShippingEvent::EventRecorded(e) => e.occurred_at,
        }
    }
}

/// Everything a committed shipment creation produced.
#[derive(Debug)]
pub struct CreateShipmentOutcome {
    pub shipment: Shipment,
    pub adjustments: Vec<VariantAdjustment>,
    pub events: Vec<ShippingEvent>,
    pub order_events: Vec<SalesOrderEvent>,
}

/// Shipment status machine and partial-shipment orchestration.
pub struct ShipmentTracker;

impl ShipmentTracker {
    /// Create a shipment against a sales order.
    ///
    /// Each requested line resolves to one of the order line's allocations
    /// at the shipment's warehouse with sufficient unfulfilled remainder;
    /// creation drives the order's `Shipped` transition, so stock leaves the
    /// ledger here, not at delivery.
    pub fn create(
        order: &mut SalesOrder,
        ledger: &mut InventoryLedger,
        cmd: &CreateShipment,
    ) -> DomainResult<CreateShipmentOutcome> {
        if order.tenant_id() != cmd.tenant_id {
            return Err(DomainError::conflict("tenant mismatch"));
        }
        if order.id_typed() != cmd.sales_order_id {
            return Err(DomainError::conflict("sales order mismatch"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::invalid_argument(
                "a shipment requires at least one line",
            ));
        }

        let mut shipment_lines = Vec::with_capacity(cmd.lines.len());
        let mut fulfillments = Vec::with_capacity(cmd.lines.len());

        for requested in &cmd.lines {
            if requested.quantity <= 0 {
                return Err(DomainError::invalid_argument("quantity must be positive"));
            }

            let line = order.line(requested.sales_order_line_id).ok_or_else(|| {
                DomainError::not_found(format!(
                    "sales order line {}",
                    requested.sales_order_line_id
                ))
            })?;

            let allocation = resolve_allocation(line.allocations(), cmd.warehouse_id, requested)?;

            shipment_lines.push(ShipmentLine {
                sales_order_line_id: requested.sales_order_line_id,
                allocation_id: allocation,
                quantity: requested.quantity,
                weight: requested.weight,
            });
            fulfillments.push(LineFulfillment {
                line_id: requested.sales_order_line_id,
                allocation_id: allocation,
                quantity: requested.quantity,
            });
        }

        let (adjustments, order_events) = SalesFulfillmentEngine::ship_lines(
            order,
            ledger,
            TransactionReference::shipment(cmd.shipment_id.0),
            &fulfillments,
            cmd.occurred_at,
        )?;

        let shipment = Shipment {
            id: cmd.shipment_id,
            tenant_id: cmd.tenant_id,
            sales_order_id: cmd.sales_order_id,
            warehouse_id: cmd.warehouse_id,
            carrier_id: cmd.carrier_id,
            status: ShipmentStatus::Created,
            lines: shipment_lines,
            events: Vec::new(),
            created_at: cmd.occurred_at,
            delivered_at: None,
            version: 1,
        };

        let events = vec![ShippingEvent::Created(ShipmentCreated {
            tenant_id: cmd.tenant_id,
            shipment_id: cmd.shipment_id,
            sales_order_id: cmd.sales_order_id,
            adjustments: adjustments.clone(),
            occurred_at: cmd.occurred_at,
        })];

        Ok(CreateShipmentOutcome {
            shipment,
            adjustments,
            events,
            order_events,
        })
    }

    /// Append a tracking entry. Observational only: the shipment's own
    /// status is untouched, terminal or not, and identical payloads are
    /// appended again rather than deduplicated.
    pub fn record_event(
        shipment: &mut Shipment,
        cmd: &RecordShipmentEvent,
    ) -> DomainResult<Vec<ShippingEvent>> {
        if shipment.tenant_id != cmd.tenant_id {
            return Err(DomainError::conflict("tenant mismatch"));
        }

        shipment.events.push(ShipmentEvent {
            status: cmd.status,
            location: cmd.location.clone(),
            description: cmd.description.clone(),
            event_date: cmd.event_date,
        });
        shipment.version += 1;

        Ok(vec![ShippingEvent::EventRecorded(ShipmentEventRecorded {
            tenant_id: cmd.tenant_id,
            shipment_id: shipment.id,
            status: cmd.status,
            occurred_at: cmd.event_date,
        })])
    }

    /// Drive the shipment status machine.
    ///
    /// Delivery marks the lines' allocations `Delivered`; when that leaves
    /// every allocation on the parent order delivered, the order itself
    /// flips to `Delivered`. This is the only delivery path besides the
    /// direct order status command.
    pub fn update_status(
        shipment: &mut Shipment,
        order: &mut SalesOrder,
        cmd: &UpdateShipmentStatus,
    ) -> DomainResult<(Vec<ShippingEvent>, Vec<SalesOrderEvent>)> {
        if shipment.tenant_id != cmd.tenant_id {
            return Err(DomainError::conflict("tenant mismatch"));
        }
        if shipment.sales_order_id != order.id_typed() {
            return Err(DomainError::conflict("sales order mismatch"));
        }

        let current = shipment.status;
        let target = cmd.target;

        if current == target {
            return Err(DomainError::already_in_status(current));
        }

        let mut order_events = Vec::new();

        match target {
            ShipmentStatus::InTransit => {
                if current != ShipmentStatus::Created {
                    return Err(DomainError::invalid_transition(current, target));
                }
                shipment.status = ShipmentStatus::InTransit;
            }
            ShipmentStatus::Delivered => {
                if current != ShipmentStatus::InTransit {
                    return Err(DomainError::invalid_transition(current, target));
                }

                for line in &shipment.lines {
                    if let Some(allocation) =
                        order.allocation_mut(line.sales_order_line_id, line.allocation_id)
                    {
                        allocation.mark_delivered();
                    }
                }

                shipment.status = ShipmentStatus::Delivered;
                shipment.delivered_at = Some(cmd.delivered_at.unwrap_or(cmd.occurred_at));

                if order.status() != SalesOrderStatus::Delivered
                    && order.all_allocations_delivered()
                {
                    let from = order.status();
                    order.complete_delivery()?;
                    order_events.push(SalesOrderEvent::StatusChanged(SalesOrderStatusChanged {
                        tenant_id: order.tenant_id(),
                        order_id: order.id_typed(),
                        from,
                        to: SalesOrderStatus::Delivered,
                        adjustments: Vec::new(),
                        occurred_at: cmd.occurred_at,
                    }));
                }
            }
            ShipmentStatus::Cancelled => {
                if current.is_terminal() {
                    return Err(DomainError::invalid_transition(current, target));
                }
                shipment.status = ShipmentStatus::Cancelled;
            }
            ShipmentStatus::Created => {
                return Err(DomainError::invalid_transition(current, target));
            }
        }

        shipment.version += 1;

        let events = vec![ShippingEvent::StatusChanged(ShipmentStatusChanged {
            tenant_id: cmd.tenant_id,
            shipment_id: shipment.id,
            from: current,
            to: shipment.status,
            occurred_at: cmd.occurred_at,
        })];

        Ok((events, order_events))
    }
}

/// Pick the order line's allocation this shipment line consumes: same
/// warehouse as the shipment, still reserved, remainder covering the
/// requested quantity.
fn resolve_allocation(
    allocations: &[stockflow_inventory::Allocation],
    warehouse_id: WarehouseId,
    requested: &NewShipmentLine,
) -> DomainResult<stockflow_inventory::AllocationId> {
    let mut best_short: Option<i64> = None;

    for allocation in allocations {
        if allocation.warehouse_id() != warehouse_id {
            continue;
        }
        if allocation.status() == AllocationStatus::Reserved
            && allocation.remaining() >= requested.quantity
        {
            return Ok(allocation.id_typed());
        }
        best_short = Some(best_short.map_or(allocation.remaining(), |b| b.max(allocation.remaining())));
    }

    Err(match best_short {
        Some(remaining) => DomainError::invalid_argument(format!(
            "quantity {} exceeds unfulfilled allocation balance {remaining} for line {} in warehouse {warehouse_id}",
            requested.quantity, requested.sales_order_line_id
        )),
        None => DomainError::not_found(format!(
            "no allocation for line {} in warehouse {warehouse_id}",
            requested.sales_order_line_id
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::AggregateId;
    use stockflow_parties::PartyId;
    use stockflow_sales::{CreateSalesOrder, NewOrderLine};
    use stockflow_inventory::VariantId;
    use uuid::Uuid;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_variant() -> VariantId {
        VariantId::new(AggregateId::new())
    }

    fn warehouse(n: u128) -> WarehouseId {
        WarehouseId::new(AggregateId::from_uuid(Uuid::from_u128(n)))
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn order_with_stock(
        tenant: TenantId,
        variant: VariantId,
        stock: i64,
        ordered: i64,
    ) -> (SalesOrder, InventoryLedger) {
        let mut ledger = InventoryLedger::new(tenant);
        ledger
            .increase(variant, warehouse(1), stock, None, None, test_time())
            .unwrap();

        let cmd = CreateSalesOrder {
            tenant_id: tenant,
            order_id: SalesOrderId::new(AggregateId::new()),
            customer_id: PartyId::new(AggregateId::new()),
            lines: vec![NewOrderLine {
                variant_id: variant,
                quantity: ordered,
                unit_price: 100,
                discount: None,
            }],
            occurred_at: test_time(),
        };
        let (order, _) = SalesFulfillmentEngine::create_order(&mut ledger, &cmd).unwrap();
        (order, ledger)
    }

    fn shipment_cmd(order: &SalesOrder, quantity: i64) -> CreateShipment {
        CreateShipment {
            tenant_id: order.tenant_id(),
            shipment_id: ShipmentId::new(AggregateId::new()),
            sales_order_id: order.id_typed(),
            warehouse_id: warehouse(1),
            carrier_id: None,
            lines: vec![NewShipmentLine {
                sales_order_line_id: order.lines()[0].id_typed(),
                quantity,
                weight: None,
            }],
            occurred_at: test_time(),
        }
    }

    #[test]
    fn creation_ships_the_order_and_decrements_stock() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 15, 5);

        let cmd = shipment_cmd(&order, 5);
        let outcome = ShipmentTracker::create(&mut order, &mut ledger, &cmd).unwrap();

        assert_eq!(outcome.shipment.status(), ShipmentStatus::Created);
        assert_eq!(order.status(), SalesOrderStatus::Shipped);
        assert_eq!(outcome.adjustments[0].quantity, -5);

        let position = ledger.position(variant, warehouse(1)).unwrap();
        assert_eq!(position.quantity(), 10);
        assert_eq!(position.reserved_quantity(), 0);
    }

    #[test]
    fn creation_requires_at_least_one_line() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 10, 5);

        let mut cmd = shipment_cmd(&order, 5);
        cmd.lines.clear();
        let err = ShipmentTracker::create(&mut order, &mut ledger, &cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn creation_beyond_allocation_remainder_is_rejected() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 10, 5);

        let cmd = shipment_cmd(&order, 8);
        let err = ShipmentTracker::create(&mut order, &mut ledger, &cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn creation_against_unknown_line_is_not_found() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 10, 5);

        let mut cmd = shipment_cmd(&order, 2);
        cmd.lines[0].sales_order_line_id = SalesOrderLineId::new(AggregateId::new());
        let err = ShipmentTracker::create(&mut order, &mut ledger, &cmd).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn recording_identical_events_appends_both() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 10, 5);
        let cmd = shipment_cmd(&order, 5);
        let mut shipment = ShipmentTracker::create(&mut order, &mut ledger, &cmd)
            .unwrap()
            .shipment;

        let record = RecordShipmentEvent {
            tenant_id: tenant,
            shipment_id: shipment.id_typed(),
            status: ShipmentStatus::InTransit,
            event_date: test_time(),
            location: Some("sorting hub".to_string()),
            description: None,
        };

        ShipmentTracker::record_event(&mut shipment, &record).unwrap();
        ShipmentTracker::record_event(&mut shipment, &record).unwrap();

        assert_eq!(shipment.events().len(), 2);
        assert_eq!(shipment.events()[0].location, shipment.events()[1].location);
        // Observational only: the shipment status is untouched.
        assert_eq!(shipment.status(), ShipmentStatus::Created);
    }

    #[test]
    fn delivery_flips_the_parent_order_when_everything_is_delivered() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 10, 5);
        let cmd = shipment_cmd(&order, 5);
        let mut shipment = ShipmentTracker::create(&mut order, &mut ledger, &cmd)
            .unwrap()
            .shipment;

        let transit = UpdateShipmentStatus {
            tenant_id: tenant,
            shipment_id: shipment.id_typed(),
            target: ShipmentStatus::InTransit,
            delivered_at: None,
            occurred_at: test_time(),
        };
        ShipmentTracker::update_status(&mut shipment, &mut order, &transit).unwrap();

        let deliver = UpdateShipmentStatus {
            tenant_id: tenant,
            shipment_id: shipment.id_typed(),
            target: ShipmentStatus::Delivered,
            delivered_at: Some(test_time()),
            occurred_at: test_time(),
        };
        let (events, order_events) =
            ShipmentTracker::update_status(&mut shipment, &mut order, &deliver).unwrap();

        assert_eq!(shipment.status(), ShipmentStatus::Delivered);
        assert!(shipment.delivered_at().is_some());
        assert_eq!(order.status(), SalesOrderStatus::Delivered);
        assert_eq!(events.len(), 1);
        assert_eq!(order_events.len(), 1);
    }

    #[test]
    fn delivery_of_a_partial_shipment_leaves_the_order_shipped() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 20, 10);

        let cmd = shipment_cmd(&order, 4);
        let mut shipment = ShipmentTracker::create(&mut order, &mut ledger, &cmd)
            .unwrap()
            .shipment;

        let transit = UpdateShipmentStatus {
            tenant_id: tenant,
            shipment_id: shipment.id_typed(),
            target: ShipmentStatus::InTransit,
            delivered_at: None,
            occurred_at: test_time(),
        };
        ShipmentTracker::update_status(&mut shipment, &mut order, &transit).unwrap();

        let deliver = UpdateShipmentStatus {
            tenant_id: tenant,
            shipment_id: shipment.id_typed(),
            target: ShipmentStatus::Delivered,
            delivered_at: None,
            occurred_at: test_time(),
        };
        let (_, order_events) =
            ShipmentTracker::update_status(&mut shipment, &mut order, &deliver).unwrap();

        // 6 of 10 units are still reserved: the order stays shipped.
        assert_eq!(order.status(), SalesOrderStatus::Shipped);
        assert!(order_events.is_empty());
    }

    #[test]
    fn delivered_shipment_rejects_further_transitions() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 10, 5);
        let cmd = shipment_cmd(&order, 5);
        let mut shipment = ShipmentTracker::create(&mut order, &mut ledger, &cmd)
            .unwrap()
            .shipment;

        for target in [ShipmentStatus::InTransit, ShipmentStatus::Delivered] {
            let step = UpdateShipmentStatus {
                tenant_id: tenant,
                shipment_id: shipment.id_typed(),
                target,
                delivered_at: None,
                occurred_at: test_time(),
            };
            ShipmentTracker::update_status(&mut shipment, &mut order, &step).unwrap();
        }

        let cancel = UpdateShipmentStatus {
            tenant_id: tenant,
            shipment_id: shipment.id_typed(),
            target: ShipmentStatus::Cancelled,
            delivered_at: None,
            occurred_at: test_time(),
        };
        let err =
            ShipmentTracker::update_status(&mut shipment, &mut order, &cancel).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn created_shipment_can_be_cancelled() {
        let tenant = test_tenant_id();
        let variant = test_variant();
        let (mut order, mut ledger) = order_with_stock(tenant, variant, 10, 5);
        let cmd = shipment_cmd(&order, 5);
        let mut shipment = ShipmentTracker::create(&mut order, &mut ledger, &cmd)
            .unwrap()
            .shipment;

        let cancel = UpdateShipmentStatus {
            tenant_id: tenant,
            shipment_id: shipment.id_typed(),
            target: ShipmentStatus::Cancelled,
            delivered_at: None,
            occurred_at: test_time(),
        };
        ShipmentTracker::update_status(&mut shipment, &mut order, &cancel).unwrap();
        assert_eq!(shipment.status(), ShipmentStatus::Cancelled);
    }
}
