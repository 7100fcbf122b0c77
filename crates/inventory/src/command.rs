use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, TenantId};

use crate::ledger::InventoryLedger;
use crate::stock::{StockMutation, VariantId, WarehouseId};
use crate::transaction::{TransactionKind, TransactionReference};

/// Command: AdjustInventory.
///
/// One stock movement against a (variant, warehouse) position, optionally
/// updating the position's minimum stock level in the same unit. A `Move`
/// additionally names the destination warehouse. Commands without a
/// `reference` and of kind `In`/`Out` are picked up by the manual-adjustment
/// gateway at the transactional boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustInventory {
    pub tenant_id: TenantId,
    pub variant_id: VariantId,
    pub warehouse_id: WarehouseId,
    pub kind: TransactionKind,
    pub quantity: i64,
    pub min_stock_level: Option<i64>,
    pub destination_warehouse_id: Option<WarehouseId>,
    pub reference: Option<TransactionReference>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Apply an adjustment command to the ledger.
///
/// Returns the movement mutations (two for a `Move`, one otherwise). The
/// caller owns transactionality: on error the mutated ledger must be
/// discarded.
pub fn apply_adjustment(
    ledger: &mut InventoryLedger,
    cmd: &AdjustInventory,
) -> DomainResult<Vec<StockMutation>> {
    let mutations = match cmd.kind {
        TransactionKind::In => vec![ledger.increase(
            cmd.variant_id,
            cmd.warehouse_id,
            cmd.quantity,
            cmd.reference,
            cmd.notes.clone(),
            cmd.occurred_at,
        )?],
        TransactionKind::Out => vec![ledger.decrease(
            cmd.variant_id,
            cmd.warehouse_id,
            cmd.quantity,
            cmd.reference,
            cmd.notes.clone(),
            cmd.occurred_at,
        )?],
        TransactionKind::Adjust => vec![ledger.set_absolute(
            cmd.variant_id,
            cmd.warehouse_id,
            cmd.quantity,
            cmd.reference,
            cmd.notes.clone(),
            cmd.occurred_at,
        )?],
        TransactionKind::Move => {
            let destination = cmd.destination_warehouse_id.ok_or_else(|| {
                DomainError::invalid_argument("destination warehouse is required for a move")
            })?;
            let (from, to) = ledger.transfer(
                cmd.variant_id,
                cmd.warehouse_id,
                destination,
                cmd.quantity,
                cmd.reference,
                cmd.notes.clone(),
                cmd.occurred_at,
            )?;
            vec![from, to]
        }
    };

    if let Some(level) = cmd.min_stock_level {
        ledger.update_min_stock_level(cmd.variant_id, cmd.warehouse_id, level)?;
    }

    Ok(mutations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::AggregateId;

    fn test_cmd(kind: TransactionKind, quantity: i64) -> AdjustInventory {
        AdjustInventory {
            tenant_id: TenantId::new(),
            variant_id: VariantId::new(AggregateId::new()),
            warehouse_id: WarehouseId::new(AggregateId::new()),
            kind,
            quantity,
            min_stock_level: None,
            destination_warehouse_id: None,
            reference: None,
            notes: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn move_without_destination_is_rejected() {
        let cmd = test_cmd(TransactionKind::Move, 5);
        let mut ledger = InventoryLedger::new(cmd.tenant_id);
        ledger
            .increase(cmd.variant_id, cmd.warehouse_id, 10, None, None, cmd.occurred_at)
            .unwrap();

        let err = apply_adjustment(&mut ledger, &cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn adjustment_can_update_min_stock_level_in_the_same_unit() {
        let mut cmd = test_cmd(TransactionKind::In, 4);
        cmd.min_stock_level = Some(10);
        let mut ledger = InventoryLedger::new(cmd.tenant_id);

        let mutations = apply_adjustment(&mut ledger, &cmd).unwrap();

        assert_eq!(mutations.len(), 1);
        let position = ledger.position(cmd.variant_id, cmd.warehouse_id).unwrap();
        assert_eq!(position.quantity(), 4);
        assert_eq!(position.min_stock_level(), 10);
    }

    #[test]
    fn out_adjustment_records_movement_mutation() {
        let cmd = test_cmd(TransactionKind::Out, 3);
        let mut ledger = InventoryLedger::new(cmd.tenant_id);
        ledger
            .increase(cmd.variant_id, cmd.warehouse_id, 8, None, None, cmd.occurred_at)
            .unwrap();

        let mutations = apply_adjustment(&mut ledger, &cmd).unwrap();

        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].quantity_delta(), -3);
    }
}
