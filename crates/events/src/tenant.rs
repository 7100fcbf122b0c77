use stockflow_core::TenantId;

use crate::EventEnvelope;

/// Helper trait for tenant-scoped messages.
///
/// Marks types that carry a tenant ID so infrastructure components can
/// filter or validate messages by tenant without knowing the payload type.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}
