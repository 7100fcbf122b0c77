use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{AggregateId, AggregateRoot, DomainError, DomainResult, TenantId};

/// Party identifier (tenant-scoped at the storage boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub AggregateId);

impl PartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Party kind: customer or supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Supplier,
}

/// Party status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Suspended,
}

/// Contact information for a party.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Reserved name of the supplier used for stock movements recorded without
/// an order reference (manual `In` adjustments).
pub const MANUAL_SUPPLIER_NAME: &str = "Manual Adjustment Supplier";

/// Reserved name of the customer used for stock movements recorded without
/// an order reference (manual `Out` adjustments).
pub const MANUAL_CUSTOMER_NAME: &str = "Manual Adjustment Customer";

/// Directory entry: a customer or supplier orders can reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    id: PartyId,
    tenant_id: TenantId,
    kind: PartyKind,
    name: String,
    contact: ContactInfo,
    status: PartyStatus,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Party {
    pub fn new(
        id: PartyId,
        tenant_id: TenantId,
        kind: PartyKind,
        name: impl Into<String>,
        contact: Option<ContactInfo>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::invalid_argument("party name cannot be empty"));
        }

        Ok(Self {
            id,
            tenant_id,
            kind,
            name,
            contact: contact.unwrap_or_default(),
            status: PartyStatus::Active,
            created_at,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Invariant helper: whether this party is allowed to transact.
    ///
    /// Suspended parties cannot transact.
    pub fn can_transact(&self) -> bool {
        self.status == PartyStatus::Active
    }

    pub fn suspend(&mut self) {
        self.status = PartyStatus::Suspended;
        self.version += 1;
    }

    pub fn reinstate(&mut self) {
        self.status = PartyStatus::Active;
        self.version += 1;
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
