//! `stockflow-infra` — the transactional boundary around the fulfillment
//! engines.
//!
//! Domain crates stay pure; this crate owns the repositories, executes each
//! command as one atomic unit (load → clone → validate/mutate → commit →
//! publish), synthesizes orders for unreferenced manual adjustments, and
//! pushes committed domain events onto the event bus.

pub mod gateway;
pub mod pricing;
pub mod service;
pub mod store;

pub use gateway::{ManualAdjustmentGateway, is_manual_movement};
pub use pricing::{StaticVariantPricing, VariantPricing};
pub use service::{BackOffice, CommandError};
pub use store::{InMemoryTenantStore, TenantStore};
