//! Customer/supplier directory entries referenced by orders.
//!
//! Party management (registration workflows, contact upkeep) lives outside
//! the fulfillment core; this crate carries only what the engines need to
//! reference a counterparty and what the manual-adjustment gateway needs to
//! synthesize one.

pub mod party;

pub use party::{
    ContactInfo, MANUAL_CUSTOMER_NAME, MANUAL_SUPPLIER_NAME, Party, PartyId, PartyKind,
    PartyStatus,
};
