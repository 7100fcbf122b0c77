use chrono::{DateTime, Utc};

use stockflow_core::{AggregateId, DomainResult, TenantId};
use stockflow_inventory::{AdjustInventory, TransactionKind};
use stockflow_parties::{
    MANUAL_CUSTOMER_NAME, MANUAL_SUPPLIER_NAME, Party, PartyId, PartyKind,
};
use stockflow_purchasing::{PurchaseOrder, PurchaseOrderId, PurchaseOrderLine};
use stockflow_sales::{SalesOrder, SalesOrderId};

use crate::store::TenantStore;

/// Whether an adjustment is a manual movement the gateway wraps into a
/// synthetic order: unreferenced, and of kind `In` or `Out`. `Adjust` and
/// `Move` never synthesize orders.
pub fn is_manual_movement(cmd: &AdjustInventory) -> bool {
    cmd.reference.is_none() && matches!(cmd.kind, TransactionKind::In | TransactionKind::Out)
}

/// Wraps unreferenced `In`/`Out` adjustments into synthetic orders so every
/// stock movement stays explainable through the order/ledger model.
pub struct ManualAdjustmentGateway<S> {
    parties: S,
}

impl<S> ManualAdjustmentGateway<S>
where
    S: TenantStore<PartyId, Party>,
{
    pub fn new(parties: S) -> Self {
        Self { parties }
    }

    /// Idempotent upsert of the reserved manual party for `kind`, keyed by
    /// its fixed name. Runs inside the adjustment's transaction, so
    /// concurrent manual adjustments cannot mint duplicates.
    pub fn ensure_manual_party(
        &self,
        tenant_id: TenantId,
        kind: PartyKind,
        now: DateTime<Utc>,
    ) -> DomainResult<Party> {
        let name = match kind {
            PartyKind::Supplier => MANUAL_SUPPLIER_NAME,
            PartyKind::Customer => MANUAL_CUSTOMER_NAME,
        };

        if let Some(existing) = self
            .parties
            .list(tenant_id)
            .into_iter()
            .find(|p| p.kind() == kind && p.name() == name)
        {
            return Ok(existing);
        }

        let party = Party::new(
            PartyId::new(AggregateId::new()),
            tenant_id,
            kind,
            name,
            None,
            now,
        )?;
        self.parties
            .upsert(tenant_id, party.id_typed(), party.clone());
        Ok(party)
    }

    /// Synthesize the `Received` purchase order explaining a manual intake.
    /// The ledger increase is performed by the adjustment itself, not here.
    pub fn synthesize_intake(
        &self,
        cmd: &AdjustInventory,
        supplier: &Party,
        order_id: PurchaseOrderId,
        unit_price: u64,
    ) -> DomainResult<PurchaseOrder> {
        PurchaseOrder::new_received(
            order_id,
            cmd.tenant_id,
            supplier.id_typed(),
            vec![PurchaseOrderLine {
                variant_id: cmd.variant_id,
                quantity: cmd.quantity,
                unit_price,
            }],
            cmd.occurred_at,
        )
    }

    /// Synthesize the `Delivered` sales order explaining a manual issue.
    /// The ledger decrease is performed by the adjustment itself, not here.
    pub fn synthesize_issue(
        &self,
        cmd: &AdjustInventory,
        customer: &Party,
        order_id: SalesOrderId,
        unit_price: u64,
    ) -> DomainResult<SalesOrder> {
        SalesOrder::new_delivered(
            order_id,
            cmd.tenant_id,
            customer.id_typed(),
            cmd.variant_id,
            cmd.warehouse_id,
            cmd.quantity,
            unit_price,
            cmd.occurred_at,
        )
    }
}
