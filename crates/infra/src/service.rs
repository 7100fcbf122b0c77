//! Command execution pipeline (application-level orchestration).
//!
//! Every public method runs one command as one atomic unit:
//!
//! ```text
//! Command
//!   ↓
//! 1. Serialize against other commands (stand-in for row-level locking)
//!   ↓
//! 2. Load owned clones of the touched aggregates
//!   ↓
//! 3. Run the engine (pure domain logic, mutates the clones)
//!   ↓
//! 4. Commit every touched aggregate together (optimistic version check)
//!   ↓
//! 5. Publish domain events to the bus (fire-after-commit, at-least-once)
//! ```
//!
//! An engine error drops the clones, so nothing is ever partially applied:
//! a reservation of 3 of 5 requested units cannot survive step 3 failing.
//! A publish failure in step 5 is logged and swallowed; the state change
//! has already committed and consumers can rebuild from the aggregates.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockflow_core::{AggregateId, AggregateRoot, DomainError, ExpectedVersion, TenantId};
use stockflow_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use stockflow_inventory::{
    AdjustInventory, InventoryEvent, InventoryLedger, MinStockLevelUpdated, StockAdjusted,
    StockPosition, TransactionKind, TransactionReference, apply_adjustment,
    summarize_adjustments,
};
use stockflow_parties::{ContactInfo, Party, PartyId, PartyKind};
use stockflow_purchasing::{
    CreatePurchaseOrder, PurchaseOrder, PurchaseOrderCreated, PurchaseOrderEvent,
    PurchaseOrderId, PurchaseReceivingEngine, UpdatePurchaseOrderStatus,
};
use stockflow_sales::{
    CreateSalesOrder, SalesFulfillmentEngine, SalesOrder, SalesOrderCreated, SalesOrderEvent,
    SalesOrderId, SalesOrderStatus, UpdateSalesOrderStatus,
};
use stockflow_shipping::{
    CreateShipment, RecordShipmentEvent, Shipment, ShipmentId, ShipmentStatus,
    ShipmentStatusChanged, ShipmentTracker, ShippingEvent, UpdateShipmentStatus,
};

use crate::gateway::{ManualAdjustmentGateway, is_manual_movement};
use crate::pricing::VariantPricing;
use crate::store::{InMemoryTenantStore, TenantStore};

/// Command execution failure.
#[derive(Debug)]
pub enum CommandError {
    /// Deterministic domain failure; the command was rejected whole.
    Domain(DomainError),
    /// The storage boundary failed (lock poisoning and the like).
    Storage(String),
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        CommandError::Domain(value)
    }
}

type PartyStore = Arc<InMemoryTenantStore<PartyId, Party>>;

enum SyntheticOrder {
    Purchase(PurchaseOrder),
    Sales(SalesOrder),
}

/// The back-office application service: one instance wires the aggregate
/// stores, the manual-adjustment gateway, the pricing collaborator and the
/// event bus behind the command methods of the fulfillment core.
pub struct BackOffice<B> {
    ledgers: Arc<InMemoryTenantStore<(), InventoryLedger>>,
    sales_orders: Arc<InMemoryTenantStore<SalesOrderId, SalesOrder>>,
    purchase_orders: Arc<InMemoryTenantStore<PurchaseOrderId, PurchaseOrder>>,
    shipments: Arc<InMemoryTenantStore<ShipmentId, Shipment>>,
    parties: PartyStore,
    gateway: ManualAdjustmentGateway<PartyStore>,
    pricing: Arc<dyn VariantPricing>,
    bus: B,
    /// Serializes commands; the in-memory stand-in for row-level locking on
    /// stock positions. Concurrent commands on the same position must not
    /// interleave.
    command_lock: Mutex<()>,
}

impl BackOffice<Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>> {
    /// Fully in-memory wiring for tests/dev.
    pub fn in_memory(pricing: Arc<dyn VariantPricing>) -> Self {
        Self::new(Arc::new(InMemoryEventBus::new()), pricing)
    }
}

impl<B> BackOffice<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(bus: B, pricing: Arc<dyn VariantPricing>) -> Self {
        let parties: PartyStore = Arc::new(InMemoryTenantStore::new());
        Self {
            ledgers: Arc::new(InMemoryTenantStore::new()),
            sales_orders: Arc::new(InMemoryTenantStore::new()),
            purchase_orders: Arc::new(InMemoryTenantStore::new()),
            shipments: Arc::new(InMemoryTenantStore::new()),
            gateway: ManualAdjustmentGateway::new(Arc::clone(&parties)),
            parties,
            pricing,
            bus,
            command_lock: Mutex::new(()),
        }
    }

    pub fn event_bus(&self) -> &B {
        &self.bus
    }

    /// Register a customer or supplier directory entry.
    pub fn register_party(
        &self,
        tenant_id: TenantId,
        kind: PartyKind,
        name: impl Into<String>,
        contact: Option<ContactInfo>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Party, CommandError> {
        let _guard = self.lock()?;
        let party = Party::new(PartyId::new(AggregateId::new()), tenant_id, kind, name, contact, now)?;
        self.parties.upsert(tenant_id, party.id_typed(), party.clone());
        Ok(party)
    }

    /// Apply one stock movement; unreferenced `In`/`Out` movements are
    /// wrapped into synthetic orders by the gateway inside the same unit.
    /// Returns the committed positions the movement touched.
    pub fn adjust_inventory(
        &self,
        cmd: AdjustInventory,
    ) -> Result<Vec<StockPosition>, CommandError> {
        let _guard = self.lock()?;
        let span = tracing::info_span!("adjust_inventory", tenant_id = %cmd.tenant_id, kind = %cmd.kind);
        let _enter = span.enter();

        let mut cmd = cmd;
        let (mut ledger, expected) = self.load_ledger(cmd.tenant_id);

        // Mint the explaining order's id up front so the ledger entry can
        // reference it; the party upsert and the order itself only happen
        // once the movement has validated.
        enum PendingSynthetic {
            Purchase(PurchaseOrderId),
            Sales(SalesOrderId),
        }
        let mut pending = None;
        if is_manual_movement(&cmd) {
            match cmd.kind {
                TransactionKind::In => {
                    let order_id = PurchaseOrderId::new(AggregateId::new());
                    cmd.reference = Some(TransactionReference::purchase_order(order_id.0));
                    pending = Some(PendingSynthetic::Purchase(order_id));
                }
                TransactionKind::Out => {
                    let order_id = SalesOrderId::new(AggregateId::new());
                    cmd.reference = Some(TransactionReference::sales_order(order_id.0));
                    pending = Some(PendingSynthetic::Sales(order_id));
                }
                TransactionKind::Adjust | TransactionKind::Move => {}
            }
        }

        let mutations = apply_adjustment(&mut ledger, &cmd)?;

        let synthetic = match pending {
            Some(PendingSynthetic::Purchase(order_id)) => {
                let supplier = self.gateway.ensure_manual_party(
                    cmd.tenant_id,
                    PartyKind::Supplier,
                    cmd.occurred_at,
                )?;
                let unit_price = self.pricing.unit_price(cmd.tenant_id, cmd.variant_id);
                Some(SyntheticOrder::Purchase(self.gateway.synthesize_intake(
                    &cmd,
                    &supplier,
                    order_id,
                    unit_price,
                )?))
            }
            Some(PendingSynthetic::Sales(order_id)) => {
                let customer = self.gateway.ensure_manual_party(
                    cmd.tenant_id,
                    PartyKind::Customer,
                    cmd.occurred_at,
                )?;
                let unit_price = self.pricing.unit_price(cmd.tenant_id, cmd.variant_id);
                Some(SyntheticOrder::Sales(self.gateway.synthesize_issue(
                    &cmd,
                    &customer,
                    order_id,
                    unit_price,
                )?))
            }
            None => None,
        };

        self.commit_ledger(cmd.tenant_id, expected, ledger.clone())?;
        match &synthetic {
            Some(SyntheticOrder::Purchase(order)) => {
                self.purchase_orders
                    .upsert(cmd.tenant_id, order.id_typed(), order.clone());
            }
            Some(SyntheticOrder::Sales(order)) => {
                self.sales_orders
                    .upsert(cmd.tenant_id, order.id_typed(), order.clone());
            }
            None => {}
        }

        let adjustments = summarize_adjustments(&mutations);
        tracing::info!(
            variant_id = %cmd.variant_id,
            quantity = cmd.quantity,
            "stock adjusted"
        );

        let ledger_stream = AggregateId::from_uuid(*cmd.tenant_id.as_uuid());
        self.publish(
            cmd.tenant_id,
            ledger_stream,
            "inventory.ledger",
            ledger.version(),
            &InventoryEvent::StockAdjusted(StockAdjusted {
                tenant_id: cmd.tenant_id,
                kind: cmd.kind,
                adjustments,
                reference: cmd.reference,
                occurred_at: cmd.occurred_at,
            }),
        );
        if let Some(level) = cmd.min_stock_level {
            self.publish(
                cmd.tenant_id,
                ledger_stream,
                "inventory.ledger",
                ledger.version(),
                &InventoryEvent::MinStockLevelUpdated(MinStockLevelUpdated {
                    tenant_id: cmd.tenant_id,
                    variant_id: cmd.variant_id,
                    warehouse_id: cmd.warehouse_id,
                    level,
                    occurred_at: cmd.occurred_at,
                }),
            );
        }
        match &synthetic {
            Some(SyntheticOrder::Purchase(order)) => self.publish(
                cmd.tenant_id,
                order.id_typed().0,
                "purchasing.order",
                order.version(),
                &PurchaseOrderEvent::Created(PurchaseOrderCreated {
                    tenant_id: cmd.tenant_id,
                    order_id: order.id_typed(),
                    supplier_id: order.supplier_id(),
                    occurred_at: cmd.occurred_at,
                }),
            ),
            Some(SyntheticOrder::Sales(order)) => self.publish(
                cmd.tenant_id,
                order.id_typed().0,
                "sales.order",
                order.version(),
                &SalesOrderEvent::Created(SalesOrderCreated {
                    tenant_id: cmd.tenant_id,
                    order_id: order.id_typed(),
                    customer_id: order.customer_id(),
                    total_amount: order.total_amount(),
                    occurred_at: cmd.occurred_at,
                }),
            ),
            None => {}
        }

        let mut positions = Vec::new();
        for mutation in &mutations {
            if let Some(position) =
                ledger.position(mutation.variant_id(), mutation.warehouse_id())
            {
                positions.push(position.clone());
            }
        }
        Ok(positions)
    }

    pub fn create_sales_order(&self, cmd: CreateSalesOrder) -> Result<SalesOrder, CommandError> {
        let _guard = self.lock()?;
        let span = tracing::info_span!("create_sales_order", tenant_id = %cmd.tenant_id, order_id = %cmd.order_id);
        let _enter = span.enter();

        self.require_transacting_party(cmd.tenant_id, cmd.customer_id, "customer")?;

        let (mut ledger, expected) = self.load_ledger(cmd.tenant_id);
        let (order, events) = SalesFulfillmentEngine::create_order(&mut ledger, &cmd)?;

        self.commit_ledger(cmd.tenant_id, expected, ledger)?;
        self.sales_orders
            .upsert(cmd.tenant_id, order.id_typed(), order.clone());

        self.publish_all(cmd.tenant_id, order.id_typed().0, "sales.order", order.version(), &events);
        Ok(order)
    }

    pub fn update_sales_order_status(
        &self,
        cmd: UpdateSalesOrderStatus,
    ) -> Result<SalesOrder, CommandError> {
        let _guard = self.lock()?;
        let span = tracing::info_span!("update_sales_order_status", tenant_id = %cmd.tenant_id, order_id = %cmd.order_id, target = %cmd.target);
        let _enter = span.enter();

        let (mut order, order_expected) = self.load_sales_order(cmd.tenant_id, cmd.order_id)?;
        let (mut ledger, ledger_expected) = self.load_ledger(cmd.tenant_id);
        let previous = order.status();

        let (_adjustments, events) =
            SalesFulfillmentEngine::update_status(&mut order, &mut ledger, &cmd)?;

        // Direct delivery sweeps the order's remaining shipments along.
        let mut swept = Vec::new();
        if order.status() == SalesOrderStatus::Delivered {
            for mut shipment in self.shipments.list(cmd.tenant_id) {
                if shipment.sales_order_id() == cmd.order_id && !shipment.status().is_terminal() {
                    let from = shipment.status();
                    shipment.mark_delivered(cmd.occurred_at);
                    swept.push((from, shipment));
                }
            }
        }

        self.commit_ledger(cmd.tenant_id, ledger_expected, ledger)?;
        checked_commit(
            self.sales_orders.as_ref(),
            cmd.tenant_id,
            cmd.order_id,
            order.clone(),
            order_expected,
        )?;
        for (_, shipment) in &swept {
            self.shipments
                .upsert(cmd.tenant_id, shipment.id_typed(), shipment.clone());
        }

        tracing::info!(from = %previous, to = %order.status(), "sales order status changed");
        self.publish_all(cmd.tenant_id, cmd.order_id.0, "sales.order", order.version(), &events);
        for (from, shipment) in &swept {
            self.publish(
                cmd.tenant_id,
                shipment.id_typed().0,
                "shipping.shipment",
                shipment.version(),
                &ShippingEvent::StatusChanged(ShipmentStatusChanged {
                    tenant_id: cmd.tenant_id,
                    shipment_id: shipment.id_typed(),
                    from: *from,
                    to: ShipmentStatus::Delivered,
                    occurred_at: cmd.occurred_at,
                }),
            );
        }
        Ok(order)
    }

    pub fn create_purchase_order(
        &self,
        cmd: CreatePurchaseOrder,
    ) -> Result<PurchaseOrder, CommandError> {
        let _guard = self.lock()?;
        let span = tracing::info_span!("create_purchase_order", tenant_id = %cmd.tenant_id, order_id = %cmd.order_id);
        let _enter = span.enter();

        self.require_transacting_party(cmd.tenant_id, cmd.supplier_id, "supplier")?;

        let (order, events) = PurchaseReceivingEngine::create_order(&cmd)?;
        self.purchase_orders
            .upsert(cmd.tenant_id, order.id_typed(), order.clone());

        self.publish_all(cmd.tenant_id, order.id_typed().0, "purchasing.order", order.version(), &events);
        Ok(order)
    }

    pub fn update_purchase_order_status(
        &self,
        cmd: UpdatePurchaseOrderStatus,
    ) -> Result<PurchaseOrder, CommandError> {
        let _guard = self.lock()?;
        let span = tracing::info_span!("update_purchase_order_status", tenant_id = %cmd.tenant_id, order_id = %cmd.order_id, target = %cmd.target);
        let _enter = span.enter();

        let (mut order, order_expected) =
            self.load_purchase_order(cmd.tenant_id, cmd.order_id)?;
        let (mut ledger, ledger_expected) = self.load_ledger(cmd.tenant_id);

        let (_adjustments, events) =
            PurchaseReceivingEngine::update_status(&mut order, &mut ledger, &cmd)?;

        self.commit_ledger(cmd.tenant_id, ledger_expected, ledger)?;
        checked_commit(
            self.purchase_orders.as_ref(),
            cmd.tenant_id,
            cmd.order_id,
            order.clone(),
            order_expected,
        )?;

        self.publish_all(cmd.tenant_id, cmd.order_id.0, "purchasing.order", order.version(), &events);
        Ok(order)
    }

    pub fn create_shipment(&self, cmd: CreateShipment) -> Result<Shipment, CommandError> {
        let _guard = self.lock()?;
        let span = tracing::info_span!("create_shipment", tenant_id = %cmd.tenant_id, shipment_id = %cmd.shipment_id);
        let _enter = span.enter();

        let (mut order, order_expected) =
            self.load_sales_order(cmd.tenant_id, cmd.sales_order_id)?;
        let (mut ledger, ledger_expected) = self.load_ledger(cmd.tenant_id);

        let outcome = ShipmentTracker::create(&mut order, &mut ledger, &cmd)?;

        self.commit_ledger(cmd.tenant_id, ledger_expected, ledger)?;
        checked_commit(
            self.sales_orders.as_ref(),
            cmd.tenant_id,
            cmd.sales_order_id,
            order.clone(),
            order_expected,
        )?;
        self.shipments.upsert(
            cmd.tenant_id,
            outcome.shipment.id_typed(),
            outcome.shipment.clone(),
        );

        self.publish_all(
            cmd.tenant_id,
            cmd.shipment_id.0,
            "shipping.shipment",
            outcome.shipment.version(),
            &outcome.events,
        );
        self.publish_all(
            cmd.tenant_id,
            cmd.sales_order_id.0,
            "sales.order",
            order.version(),
            &outcome.order_events,
        );
        Ok(outcome.shipment)
    }

    pub fn record_shipment_event(
        &self,
        cmd: RecordShipmentEvent,
    ) -> Result<Shipment, CommandError> {
        let _guard = self.lock()?;
        let span = tracing::info_span!("record_shipment_event", tenant_id = %cmd.tenant_id, shipment_id = %cmd.shipment_id);
        let _enter = span.enter();

        let (mut shipment, expected) = self.load_shipment(cmd.tenant_id, cmd.shipment_id)?;
        let events = ShipmentTracker::record_event(&mut shipment, &cmd)?;

        checked_commit(
            self.shipments.as_ref(),
            cmd.tenant_id,
            cmd.shipment_id,
            shipment.clone(),
            expected,
        )?;

        self.publish_all(
            cmd.tenant_id,
            cmd.shipment_id.0,
            "shipping.shipment",
            shipment.version(),
            &events,
        );
        Ok(shipment)
    }

    pub fn update_shipment_status(
        &self,
        cmd: UpdateShipmentStatus,
    ) -> Result<Shipment, CommandError> {
        let _guard = self.lock()?;
        let span = tracing::info_span!("update_shipment_status", tenant_id = %cmd.tenant_id, shipment_id = %cmd.shipment_id, target = %cmd.target);
        let _enter = span.enter();

        let (mut shipment, shipment_expected) =
            self.load_shipment(cmd.tenant_id, cmd.shipment_id)?;
        let (mut order, order_expected) =
            self.load_sales_order(cmd.tenant_id, shipment.sales_order_id())?;

        let (events, order_events) =
            ShipmentTracker::update_status(&mut shipment, &mut order, &cmd)?;

        checked_commit(
            self.shipments.as_ref(),
            cmd.tenant_id,
            cmd.shipment_id,
            shipment.clone(),
            shipment_expected,
        )?;
        checked_commit(
            self.sales_orders.as_ref(),
            cmd.tenant_id,
            order.id_typed(),
            order.clone(),
            order_expected,
        )?;

        self.publish_all(
            cmd.tenant_id,
            cmd.shipment_id.0,
            "shipping.shipment",
            shipment.version(),
            &events,
        );
        self.publish_all(
            cmd.tenant_id,
            order.id_typed().0,
            "sales.order",
            order.version(),
            &order_events,
        );
        Ok(shipment)
    }

    // Read side -----------------------------------------------------------

    pub fn stock_position(
        &self,
        tenant_id: TenantId,
        variant_id: stockflow_inventory::VariantId,
        warehouse_id: stockflow_inventory::WarehouseId,
    ) -> Option<StockPosition> {
        self.ledgers
            .get(tenant_id, &())
            .and_then(|l| l.position(variant_id, warehouse_id).cloned())
    }

    pub fn inventory_transactions(
        &self,
        tenant_id: TenantId,
    ) -> Vec<stockflow_inventory::InventoryTransaction> {
        self.ledgers
            .get(tenant_id, &())
            .map(|l| l.transactions().to_vec())
            .unwrap_or_default()
    }

    pub fn sales_order(&self, tenant_id: TenantId, order_id: SalesOrderId) -> Option<SalesOrder> {
        self.sales_orders.get(tenant_id, &order_id)
    }

    pub fn list_sales_orders(&self, tenant_id: TenantId) -> Vec<SalesOrder> {
        self.sales_orders.list(tenant_id)
    }

    pub fn purchase_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> Option<PurchaseOrder> {
        self.purchase_orders.get(tenant_id, &order_id)
    }

    pub fn list_purchase_orders(&self, tenant_id: TenantId) -> Vec<PurchaseOrder> {
        self.purchase_orders.list(tenant_id)
    }

    pub fn shipment(&self, tenant_id: TenantId, shipment_id: ShipmentId) -> Option<Shipment> {
        self.shipments.get(tenant_id, &shipment_id)
    }

    pub fn party(&self, tenant_id: TenantId, party_id: PartyId) -> Option<Party> {
        self.parties.get(tenant_id, &party_id)
    }

    pub fn list_parties(&self, tenant_id: TenantId) -> Vec<Party> {
        self.parties.list(tenant_id)
    }

    // Internals -----------------------------------------------------------

    fn lock(&self) -> Result<MutexGuard<'_, ()>, CommandError> {
        self.command_lock
            .lock()
            .map_err(|_| CommandError::Storage("command lock poisoned".to_string()))
    }

    fn load_ledger(&self, tenant_id: TenantId) -> (InventoryLedger, ExpectedVersion) {
        match self.ledgers.get(tenant_id, &()) {
            Some(ledger) => {
                let version = ledger.version();
                (ledger, ExpectedVersion::Exact(version))
            }
            None => (InventoryLedger::new(tenant_id), ExpectedVersion::Exact(0)),
        }
    }

    fn commit_ledger(
        &self,
        tenant_id: TenantId,
        expected: ExpectedVersion,
        ledger: InventoryLedger,
    ) -> Result<(), CommandError> {
        let stored_version = self
            .ledgers
            .get(tenant_id, &())
            .map(|l| l.version())
            .unwrap_or(0);
        expected.check(stored_version)?;
        self.ledgers.upsert(tenant_id, (), ledger);
        Ok(())
    }

    fn load_sales_order(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
    ) -> Result<(SalesOrder, ExpectedVersion), CommandError> {
        let order = self
            .sales_orders
            .get(tenant_id, &order_id)
            .ok_or_else(|| DomainError::not_found(format!("sales order {order_id}")))?;
        let version = order.version();
        Ok((order, ExpectedVersion::Exact(version)))
    }

    fn load_purchase_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> Result<(PurchaseOrder, ExpectedVersion), CommandError> {
        let order = self
            .purchase_orders
            .get(tenant_id, &order_id)
            .ok_or_else(|| DomainError::not_found(format!("purchase order {order_id}")))?;
        let version = order.version();
        Ok((order, ExpectedVersion::Exact(version)))
    }

    fn load_shipment(
        &self,
        tenant_id: TenantId,
        shipment_id: ShipmentId,
    ) -> Result<(Shipment, ExpectedVersion), CommandError> {
        let shipment = self
            .shipments
            .get(tenant_id, &shipment_id)
            .ok_or_else(|| DomainError::not_found(format!("shipment {shipment_id}")))?;
        let version = shipment.version();
        Ok((shipment, ExpectedVersion::Exact(version)))
    }

    fn require_transacting_party(
        &self,
        tenant_id: TenantId,
        party_id: PartyId,
        role: &str,
    ) -> Result<Party, CommandError> {
        let party = self
            .parties
            .get(tenant_id, &party_id)
            .ok_or_else(|| DomainError::not_found(format!("{role} {party_id}")))?;
        if !party.can_transact() {
            return Err(DomainError::invalid_argument(format!(
                "{role} {party_id} is suspended"
            ))
            .into());
        }
        Ok(party)
    }

    fn publish_all<E>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        sequence_number: u64,
        events: &[E],
    ) where
        E: Event + Serialize,
    {
        for event in events {
            self.publish(tenant_id, aggregate_id, aggregate_type, sequence_number, event);
        }
    }

    /// Fire-after-commit: failures are logged, never propagated. The state
    /// change is already durable and consumers must tolerate gaps/replays.
    fn publish<E>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        sequence_number: u64,
        event: &E,
    ) where
        E: Event + Serialize,
    {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(%err, event_type = event.event_type(), "failed to serialize event payload");
                return;
            }
        };

        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type,
            sequence_number,
            payload,
        );
        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(?err, event_type = event.event_type(), "event publication failed after commit");
        }
    }
}

/// Version-checked aggregate write-back.
fn checked_commit<K, V, S>(
    store: &S,
    tenant_id: TenantId,
    key: K,
    value: V,
    expected: ExpectedVersion,
) -> Result<(), CommandError>
where
    K: Clone,
    V: AggregateRoot,
    S: TenantStore<K, V> + ?Sized,
{
    let stored_version = store.get(tenant_id, &key).map(|v| v.version()).unwrap_or(0);
    expected.check(stored_version)?;
    store.upsert(tenant_id, key, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    use crate::pricing::StaticVariantPricing;
    use stockflow_inventory::{ReferenceType, VariantId, WarehouseId};
    use stockflow_parties::{MANUAL_CUSTOMER_NAME, MANUAL_SUPPLIER_NAME};
    use stockflow_purchasing::{NewPurchaseLine, PurchaseOrderStatus};
    use stockflow_sales::{AllocationRequest, NewOrderLine};
    use stockflow_shipping::NewShipmentLine;
    use uuid::Uuid;

    type TestBackOffice = BackOffice<Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    struct Fixture {
        service: TestBackOffice,
        pricing: Arc<StaticVariantPricing>,
        tenant: TenantId,
    }

    fn fixture() -> Fixture {
        let pricing = Arc::new(StaticVariantPricing::new());
        let service = BackOffice::in_memory(pricing.clone() as Arc<dyn VariantPricing>);
        Fixture {
            service,
            pricing,
            tenant: TenantId::new(),
        }
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

    fn adjust(
        tenant: TenantId,
        variant: VariantId,
        warehouse_id: WarehouseId,
        kind: TransactionKind,
        quantity: i64,
    ) -> AdjustInventory {
        AdjustInventory {
            tenant_id: tenant,
            variant_id: variant,
            warehouse_id,
            kind,
            quantity,
            min_stock_level: None,
            destination_warehouse_id: None,
            reference: None,
            notes: None,
            occurred_at: test_time(),
        }
    }

    fn stock(fx: &Fixture, variant: VariantId, warehouse_id: WarehouseId, quantity: i64) {
        fx.service
            .adjust_inventory(adjust(fx.tenant, variant, warehouse_id, TransactionKind::In, quantity))
            .unwrap();
    }

    fn customer(fx: &Fixture) -> PartyId {
        fx.service
            .register_party(fx.tenant, PartyKind::Customer, "Acme Retail", None, test_time())
            .unwrap()
            .id_typed()
    }

    fn supplier(fx: &Fixture) -> PartyId {
        fx.service
            .register_party(fx.tenant, PartyKind::Supplier, "Northwind Goods", None, test_time())
            .unwrap()
            .id_typed()
    }

    fn sales_order(fx: &Fixture, variant: VariantId, quantity: i64) -> SalesOrder {
        fx.service
            .create_sales_order(CreateSalesOrder {
                tenant_id: fx.tenant,
                order_id: SalesOrderId::new(AggregateId::new()),
                customer_id: customer(fx),
                lines: vec![NewOrderLine {
                    variant_id: variant,
                    quantity,
                    unit_price: 100,
                    discount: None,
                }],
                occurred_at: test_time(),
            })
            .unwrap()
    }

    #[test]
    fn manual_out_synthesizes_a_delivered_sales_order() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 20);
        fx.pricing.set(fx.tenant, variant, 250);

        let positions = fx
            .service
            .adjust_inventory(adjust(fx.tenant, variant, warehouse(1), TransactionKind::Out, 5))
            .unwrap();

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity(), 15);

        let orders = fx.service.list_sales_orders(fx.tenant);
        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.status(), SalesOrderStatus::Delivered);
        assert_eq!(order.total_amount(), 5 * 250);

        let manual_customer = fx.service.party(fx.tenant, order.customer_id()).unwrap();
        assert_eq!(manual_customer.name(), MANUAL_CUSTOMER_NAME);
        assert_eq!(manual_customer.kind(), PartyKind::Customer);

        // The ledger entry references the synthetic order.
        let out = fx
            .service
            .inventory_transactions(fx.tenant)
            .into_iter()
            .find(|t| t.kind == TransactionKind::Out)
            .unwrap();
        let reference = out.reference.unwrap();
        assert_eq!(reference.kind, ReferenceType::SalesOrder);
        assert_eq!(reference.id, order.id_typed().0);
    }

    #[test]
    fn manual_in_synthesizes_a_received_purchase_order_and_reuses_the_party() {
        let fx = fixture();
        let variant = test_variant();

        stock(&fx, variant, warehouse(1), 10);
        stock(&fx, variant, warehouse(1), 7);

        let orders = fx.service.list_purchase_orders(fx.tenant);
        assert_eq!(orders.len(), 2);
        for order in &orders {
            assert_eq!(order.status(), PurchaseOrderStatus::Received);
        }

        // One reserved supplier serves every manual intake.
        let suppliers: Vec<_> = fx
            .service
            .list_parties(fx.tenant)
            .into_iter()
            .filter(|p| p.name() == MANUAL_SUPPLIER_NAME)
            .collect();
        assert_eq!(suppliers.len(), 1);
        assert_eq!(orders[0].supplier_id(), orders[1].supplier_id());
    }

    #[test]
    fn adjust_and_move_kinds_never_synthesize_orders() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 20);
        let synthesized_before = fx.service.list_purchase_orders(fx.tenant).len();

        let mut set_absolute = adjust(fx.tenant, variant, warehouse(1), TransactionKind::Adjust, 12);
        set_absolute.notes = Some("cycle count".to_string());
        fx.service.adjust_inventory(set_absolute).unwrap();

        let mut movement = adjust(fx.tenant, variant, warehouse(1), TransactionKind::Move, 5);
        movement.destination_warehouse_id = Some(warehouse(2));
        fx.service.adjust_inventory(movement).unwrap();

        assert_eq!(fx.service.list_purchase_orders(fx.tenant).len(), synthesized_before);
        assert!(fx.service.list_sales_orders(fx.tenant).is_empty());
    }

    #[test]
    fn move_returns_both_positions_and_two_ledger_rows() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 20);
        stock(&fx, variant, warehouse(2), 5);

        let mut movement = adjust(fx.tenant, variant, warehouse(1), TransactionKind::Move, 5);
        movement.destination_warehouse_id = Some(warehouse(2));
        let positions = fx.service.adjust_inventory(movement).unwrap();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].quantity(), 15);
        assert_eq!(positions[1].quantity(), 10);

        let moves: Vec<_> = fx
            .service
            .inventory_transactions(fx.tenant)
            .into_iter()
            .filter(|t| t.kind == TransactionKind::Move)
            .collect();
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn insufficient_manual_out_rejects_the_whole_command() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 3);

        let err = fx
            .service
            .adjust_inventory(adjust(fx.tenant, variant, warehouse(1), TransactionKind::Out, 8))
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Domain(DomainError::InsufficientStock {
                requested: 8,
                available: 3
            })
        ));

        // Neither a synthetic order nor a manual party survived the rollback.
        assert!(fx.service.list_sales_orders(fx.tenant).is_empty());
        assert!(
            !fx.service
                .list_parties(fx.tenant)
                .iter()
                .any(|p| p.name() == MANUAL_CUSTOMER_NAME)
        );
        assert_eq!(
            fx.service
                .stock_position(fx.tenant, variant, warehouse(1))
                .unwrap()
                .quantity(),
            3
        );
    }

    #[test]
    fn create_sales_order_requires_a_known_customer() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 10);

        let err = fx
            .service
            .create_sales_order(CreateSalesOrder {
                tenant_id: fx.tenant,
                order_id: SalesOrderId::new(AggregateId::new()),
                customer_id: PartyId::new(AggregateId::new()),
                lines: vec![NewOrderLine {
                    variant_id: variant,
                    quantity: 1,
                    unit_price: 100,
                    discount: None,
                }],
                occurred_at: test_time(),
            })
            .unwrap_err();
        assert!(matches!(err, CommandError::Domain(DomainError::NotFound(_))));
    }

    #[test]
    fn purchase_receiving_books_stock_through_the_service() {
        let fx = fixture();
        let variant = test_variant();
        let supplier_id = supplier(&fx);

        let order = fx
            .service
            .create_purchase_order(CreatePurchaseOrder {
                tenant_id: fx.tenant,
                order_id: PurchaseOrderId::new(AggregateId::new()),
                supplier_id,
                lines: vec![NewPurchaseLine {
                    variant_id: variant,
                    quantity: 25,
                    unit_price: 40,
                }],
                occurred_at: test_time(),
            })
            .unwrap();

        for target in [PurchaseOrderStatus::Ordered, PurchaseOrderStatus::Received] {
            fx.service
                .update_purchase_order_status(UpdatePurchaseOrderStatus {
                    tenant_id: fx.tenant,
                    order_id: order.id_typed(),
                    target,
                    warehouse_id: Some(warehouse(1)),
                    occurred_at: test_time(),
                })
                .unwrap();
        }

        assert_eq!(
            fx.service
                .stock_position(fx.tenant, variant, warehouse(1))
                .unwrap()
                .quantity(),
            25
        );
    }

    #[test]
    fn shipment_lifecycle_delivers_the_order() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 15);
        let order = sales_order(&fx, variant, 5);

        let shipment = fx
            .service
            .create_shipment(CreateShipment {
                tenant_id: fx.tenant,
                shipment_id: ShipmentId::new(AggregateId::new()),
                sales_order_id: order.id_typed(),
                warehouse_id: warehouse(1),
                carrier_id: None,
                lines: vec![NewShipmentLine {
                    sales_order_line_id: order.lines()[0].id_typed(),
                    quantity: 5,
                    weight: Some(1_200),
                }],
                occurred_at: test_time(),
            })
            .unwrap();

        let position = fx
            .service
            .stock_position(fx.tenant, variant, warehouse(1))
            .unwrap();
        assert_eq!(position.quantity(), 10);
        assert_eq!(position.reserved_quantity(), 0);

        for target in [ShipmentStatus::InTransit, ShipmentStatus::Delivered] {
            fx.service
                .update_shipment_status(UpdateShipmentStatus {
                    tenant_id: fx.tenant,
                    shipment_id: shipment.id_typed(),
                    target,
                    delivered_at: None,
                    occurred_at: test_time(),
                })
                .unwrap();
        }

        let order = fx.service.sales_order(fx.tenant, order.id_typed()).unwrap();
        assert_eq!(order.status(), SalesOrderStatus::Delivered);
    }

    #[test]
    fn direct_delivery_sweeps_remaining_shipments() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 20);
        let order = sales_order(&fx, variant, 10);

        // 4 units leave via a tracked shipment...
        let shipment = fx
            .service
            .create_shipment(CreateShipment {
                tenant_id: fx.tenant,
                shipment_id: ShipmentId::new(AggregateId::new()),
                sales_order_id: order.id_typed(),
                warehouse_id: warehouse(1),
                carrier_id: None,
                lines: vec![NewShipmentLine {
                    sales_order_line_id: order.lines()[0].id_typed(),
                    quantity: 4,
                    weight: None,
                }],
                occurred_at: test_time(),
            })
            .unwrap();

        // ...the remaining 6 via a direct ship command.
        fx.service
            .update_sales_order_status(UpdateSalesOrderStatus {
                tenant_id: fx.tenant,
                order_id: order.id_typed(),
                target: SalesOrderStatus::Shipped,
                allocations: Some(vec![AllocationRequest {
                    variant_id: variant,
                    warehouse_id: warehouse(1),
                    quantity: 6,
                }]),
                occurred_at: test_time(),
            })
            .unwrap();

        let order = fx
            .service
            .update_sales_order_status(UpdateSalesOrderStatus {
                tenant_id: fx.tenant,
                order_id: order.id_typed(),
                target: SalesOrderStatus::Delivered,
                allocations: None,
                occurred_at: test_time(),
            })
            .unwrap();

        assert_eq!(order.status(), SalesOrderStatus::Delivered);
        let shipment = fx.service.shipment(fx.tenant, shipment.id_typed()).unwrap();
        assert_eq!(shipment.status(), ShipmentStatus::Delivered);
    }

    #[test]
    fn cancelling_an_order_restores_reservations() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 10);
        let order = sales_order(&fx, variant, 7);

        assert_eq!(
            fx.service
                .stock_position(fx.tenant, variant, warehouse(1))
                .unwrap()
                .reserved_quantity(),
            7
        );

        fx.service
            .update_sales_order_status(UpdateSalesOrderStatus {
                tenant_id: fx.tenant,
                order_id: order.id_typed(),
                target: SalesOrderStatus::Cancelled,
                allocations: None,
                occurred_at: test_time(),
            })
            .unwrap();

        let position = fx
            .service
            .stock_position(fx.tenant, variant, warehouse(1))
            .unwrap();
        assert_eq!(position.reserved_quantity(), 0);
        assert_eq!(position.quantity(), 10);
    }

    #[test]
    fn repeated_shipment_events_are_both_appended() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 10);
        let order = sales_order(&fx, variant, 5);

        let shipment = fx
            .service
            .create_shipment(CreateShipment {
                tenant_id: fx.tenant,
                shipment_id: ShipmentId::new(AggregateId::new()),
                sales_order_id: order.id_typed(),
                warehouse_id: warehouse(1),
                carrier_id: None,
                lines: vec![NewShipmentLine {
                    sales_order_line_id: order.lines()[0].id_typed(),
                    quantity: 5,
                    weight: None,
                }],
                occurred_at: test_time(),
            })
            .unwrap();

        let record = RecordShipmentEvent {
            tenant_id: fx.tenant,
            shipment_id: shipment.id_typed(),
            status: ShipmentStatus::InTransit,
            event_date: test_time(),
            location: Some("sorting hub".to_string()),
            description: Some("scanned".to_string()),
        };
        fx.service.record_shipment_event(record.clone()).unwrap();
        let shipment = fx.service.record_shipment_event(record).unwrap();

        assert_eq!(shipment.events().len(), 2);
    }

    #[test]
    fn committed_commands_publish_events_on_the_bus() {
        let fx = fixture();
        let subscription = fx.service.event_bus().subscribe();
        let variant = test_variant();

        stock(&fx, variant, warehouse(1), 10);

        // Manual intake commits: one stock event + one synthetic order event.
        let first = subscription.try_recv().unwrap();
        assert_eq!(first.tenant_id(), fx.tenant);
        assert_eq!(first.aggregate_type(), "inventory.ledger");
        let second = subscription.try_recv().unwrap();
        assert_eq!(second.aggregate_type(), "purchasing.order");
    }

    #[test]
    fn rejected_commands_publish_nothing() {
        let fx = fixture();
        let variant = test_variant();
        stock(&fx, variant, warehouse(1), 3);
        let subscription = fx.service.event_bus().subscribe();

        let err = fx
            .service
            .adjust_inventory(adjust(fx.tenant, variant, warehouse(1), TransactionKind::Out, 9))
            .unwrap_err();
        assert!(matches!(err, CommandError::Domain(_)));
        assert!(subscription.try_recv().is_err());
    }
}
