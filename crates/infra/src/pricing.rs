use std::collections::HashMap;
use std::sync::RwLock;

use stockflow_core::TenantId;
use stockflow_inventory::VariantId;

/// Collaborator resolving the effective unit price of a variant.
///
/// Catalog pricing lives outside the fulfillment core; this is the seam the
/// manual-adjustment gateway uses to value synthesized sales orders.
pub trait VariantPricing: Send + Sync {
    /// Effective unit price in smallest currency unit. Unknown variants
    /// price at zero.
    fn unit_price(&self, tenant_id: TenantId, variant_id: VariantId) -> u64;
}

/// Fixed price table, for tests/dev.
#[derive(Debug, Default)]
pub struct StaticVariantPricing {
    prices: RwLock<HashMap<(TenantId, VariantId), u64>>,
}

impl StaticVariantPricing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tenant_id: TenantId, variant_id: VariantId, unit_price: u64) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert((tenant_id, variant_id), unit_price);
        }
    }
}

impl VariantPricing for StaticVariantPricing {
    fn unit_price(&self, tenant_id: TenantId, variant_id: VariantId) -> u64 {
        self.prices
            .read()
            .ok()
            .and_then(|prices| prices.get(&(tenant_id, variant_id)).copied())
            .unwrap_or(0)
    }
}
