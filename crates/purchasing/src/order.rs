use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, AggregateRoot, DomainError, DomainResult, TenantId};
use stockflow_inventory::VariantId;
use stockflow_parties::PartyId;

/// Purchase order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order status lifecycle.
///
/// `Pending` is initial; `Received` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    Pending,
    Ordered,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            PurchaseOrderStatus::Pending => "pending",
            PurchaseOrderStatus::Ordered => "ordered",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Purchase order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub variant_id: VariantId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub(crate) id: PurchaseOrderId,
    pub(crate) tenant_id: TenantId,
    pub(crate) supplier_id: PartyId,
    pub(crate) status: PurchaseOrderStatus,
    pub(crate) lines: Vec<PurchaseOrderLine>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) version: u64,
}

impl PurchaseOrder {
    /// Build an order that is already received, for goods booked after the
    /// fact (the manual-adjustment path). Does not touch the ledger.
    pub fn new_received(
        id: PurchaseOrderId,
        tenant_id: TenantId,
        supplier_id: PartyId,
        lines: Vec<PurchaseOrderLine>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::invalid_argument(
                "a purchase order requires at least one line",
            ));
        }
        if lines.iter().any(|l| l.quantity <= 0) {
            return Err(DomainError::invalid_argument("quantity must be positive"));
        }

        Ok(Self {
            id,
            tenant_id,
            supplier_id,
            status: PurchaseOrderStatus::Received,
            lines,
            created_at: occurred_at,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn supplier_id(&self) -> PartyId {
        self.supplier_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_constructor_requires_lines() {
        let err = PurchaseOrder::new_received(
            PurchaseOrderId::new(AggregateId::new()),
            TenantId::new(),
            PartyId::new(AggregateId::new()),
            Vec::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn received_constructor_starts_terminal() {
        let order = PurchaseOrder::new_received(
            PurchaseOrderId::new(AggregateId::new()),
            TenantId::new(),
            PartyId::new(AggregateId::new()),
            vec![PurchaseOrderLine {
                variant_id: VariantId::new(AggregateId::new()),
                quantity: 3,
                unit_price: 250,
            }],
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.status(), PurchaseOrderStatus::Received);
        assert!(order.status().is_terminal());
    }
}
