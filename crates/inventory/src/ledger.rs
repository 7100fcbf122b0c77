use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{AggregateRoot, DomainError, DomainResult, TenantId};

use crate::stock::{StockMutation, StockPosition, VariantId, WarehouseId};
use crate::transaction::{
    InventoryTransaction, TransactionKind, TransactionReference,
};

/// Aggregate root: the per-tenant stock ledger.
///
/// Owns every [`StockPosition`] and the append-only movement log. All
/// counter mutations go through the operations below; each movement appends
/// its transaction entries in the same call, so positions and log can never
/// drift apart. Reservations adjust counters without appending; they are
/// bookkeeping, not movements.
///
/// The ledger itself is synchronous and storage-free. The transactional
/// boundary loads it, applies one command's worth of mutations and either
/// commits the whole ledger or discards it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLedger {
    tenant_id: TenantId,
    positions: HashMap<(VariantId, WarehouseId), StockPosition>,
    transactions: Vec<InventoryTransaction>,
    version: u64,
}

impl InventoryLedger {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            positions: HashMap::new(),
            transactions: Vec::new(),
            version: 0,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn position(&self, variant_id: VariantId, warehouse_id: WarehouseId) -> Option<&StockPosition> {
        self.positions.get(&(variant_id, warehouse_id))
    }

    /// Every position holding the given variant, in unspecified order.
    pub fn positions_for_variant(&self, variant_id: VariantId) -> Vec<&StockPosition> {
        self.positions
            .values()
            .filter(|p| p.variant_id() == variant_id)
            .collect()
    }

    pub fn positions(&self) -> impl Iterator<Item = &StockPosition> {
        self.positions.values()
    }

    /// The full movement log, in append order.
    pub fn transactions(&self) -> &[InventoryTransaction] {
        &self.transactions
    }

    /// Add `qty` units to a position, creating it on first movement.
    pub fn increase(
        &mut self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        qty: i64,
        reference: Option<TransactionReference>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<StockMutation> {
        ensure_positive(qty)?;

        let position = self.position_mut_or_create(variant_id, warehouse_id);
        let before = position.snapshot();
        position.quantity += qty;
        let after = position.snapshot();

        self.append_transaction(variant_id, warehouse_id, TransactionKind::In, qty, reference, notes, now);
        self.version += 1;

        Ok(StockMutation { before, after })
    }

    /// Remove `qty` units from a position.
    ///
    /// Fails with [`DomainError::InsufficientStock`] when the unreserved
    /// balance is short: dipping below the reserved floor would break the
    /// `reserved_quantity <= quantity` invariant.
    pub fn decrease(
        &mut self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        qty: i64,
        reference: Option<TransactionReference>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<StockMutation> {
        ensure_positive(qty)?;

        let available = self
            .position(variant_id, warehouse_id)
            .map(StockPosition::available)
            .unwrap_or(0);
        if available < qty {
            return Err(DomainError::insufficient_stock(qty, available));
        }

        let position = self.position_mut_or_create(variant_id, warehouse_id);
        let before = position.snapshot();
        position.quantity -= qty;
        let after = position.snapshot();

        self.append_transaction(variant_id, warehouse_id, TransactionKind::Out, -qty, reference, notes, now);
        self.version += 1;

        Ok(StockMutation { before, after })
    }

    /// Overwrite a position's quantity with an absolute value.
    ///
    /// The appended `Adjust` entry carries the signed difference so the log
    /// still reconciles.
    pub fn set_absolute(
        &mut self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        qty: i64,
        reference: Option<TransactionReference>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<StockMutation> {
        if qty < 0 {
            return Err(DomainError::invalid_argument(
                "quantity cannot be negative",
            ));
        }

        let reserved = self
            .position(variant_id, warehouse_id)
            .map(StockPosition::reserved_quantity)
            .unwrap_or(0);
        if qty < reserved {
            return Err(DomainError::invalid_argument(format!(
                "cannot set quantity to {qty} below reserved quantity {reserved}"
            )));
        }

        let position = self.position_mut_or_create(variant_id, warehouse_id);
        let before = position.snapshot();
        position.quantity = qty;
        let after = position.snapshot();

        let delta = after.quantity - before.quantity;
        self.append_transaction(variant_id, warehouse_id, TransactionKind::Adjust, delta, reference, notes, now);
        self.version += 1;

        Ok(StockMutation { before, after })
    }

    /// Relocate `qty` units between two warehouses atomically.
    ///
    /// Appends exactly one debit/credit pair of `Move` entries.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        &mut self,
        variant_id: VariantId,
        source: WarehouseId,
        destination: WarehouseId,
        qty: i64,
        reference: Option<TransactionReference>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<(StockMutation, StockMutation)> {
        ensure_positive(qty)?;
        if source == destination {
            return Err(DomainError::invalid_argument(
                "source and destination warehouse must differ",
            ));
        }

        let available = self
            .position(variant_id, source)
            .map(StockPosition::available)
            .unwrap_or(0);
        if available < qty {
            return Err(DomainError::insufficient_stock(qty, available));
        }

        let source_position = self.position_mut_or_create(variant_id, source);
        let source_before = source_position.snapshot();
        source_position.quantity -= qty;
        let source_after = source_position.snapshot();

        let destination_position = self.position_mut_or_create(variant_id, destination);
        let destination_before = destination_position.snapshot();
        destination_position.quantity += qty;
        let destination_after = destination_position.snapshot();

        self.append_transaction(variant_id, source, TransactionKind::Move, -qty, reference, notes.clone(), now);
        self.append_transaction(variant_id, destination, TransactionKind::Move, qty, reference, notes, now);
        self.version += 1;

        Ok((
            StockMutation {
                before: source_before,
                after: source_after,
            },
            StockMutation {
                before: destination_before,
                after: destination_after,
            },
        ))
    }

    /// Reconfigure a position's minimum stock level.
    ///
    /// A pure setter: no movement entry is appended.
    pub fn update_min_stock_level(
        &mut self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        level: i64,
    ) -> DomainResult<StockMutation> {
        if level < 0 {
            return Err(DomainError::invalid_argument(
                "min stock level cannot be negative",
            ));
        }

        let position = self.position_mut_or_create(variant_id, warehouse_id);
        let before = position.snapshot();
        position.min_stock_level = level;
        let after = position.snapshot();
        self.version += 1;

        Ok(StockMutation { before, after })
    }

    /// Hold `qty` units of a position for an allocation.
    ///
    /// Reservations are bookkeeping, not movements: no transaction entry.
    pub fn reserve_stock(
        &mut self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> DomainResult<()> {
        ensure_positive(qty)?;

        let available = self
            .position(variant_id, warehouse_id)
            .map(StockPosition::available)
            .unwrap_or(0);
        if available < qty {
            return Err(DomainError::insufficient_stock(qty, available));
        }

        let position = self.position_mut_or_create(variant_id, warehouse_id);
        position.reserved_quantity += qty;
        self.version += 1;

        Ok(())
    }

    /// Give back `qty` units of a position's reservation.
    pub fn release_stock(
        &mut self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> DomainResult<()> {
        ensure_positive(qty)?;

        let reserved = self
            .position(variant_id, warehouse_id)
            .map(StockPosition::reserved_quantity)
            .unwrap_or(0);
        if reserved < qty {
            return Err(DomainError::invalid_argument(format!(
                "cannot release {qty} units, only {reserved} reserved"
            )));
        }

        let position = self.position_mut_or_create(variant_id, warehouse_id);
        position.reserved_quantity -= qty;
        self.version += 1;

        Ok(())
    }

    fn position_mut_or_create(
        &mut self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
    ) -> &mut StockPosition {
        self.positions
            .entry((variant_id, warehouse_id))
            .or_insert_with(|| StockPosition::empty(variant_id, warehouse_id))
    }

    #[allow(clippy::too_many_arguments)]
    fn append_transaction(
        &mut self,
        variant_id: VariantId,
        warehouse_id: WarehouseId,
        kind: TransactionKind,
        quantity: i64,
        reference: Option<TransactionReference>,
        notes: Option<String>,
        occurred_at: DateTime<Utc>,
    ) {
        self.transactions.push(InventoryTransaction {
            transaction_id: Uuid::now_v7(),
            variant_id,
            warehouse_id,
            kind,
            quantity,
            occurred_at,
            reference,
            notes,
        });
    }
}

impl AggregateRoot for InventoryLedger {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.tenant_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn ensure_positive(qty: i64) -> DomainResult<()> {
    if qty <= 0 {
        return Err(DomainError::invalid_argument("quantity must be positive"));
    }
    Ok(())
}
