//! `stockflow-events` — domain-event publication plumbing.
//!
//! Engines return domain events describing committed state changes; the
//! transactional boundary wraps them in envelopes and publishes them
//! **after** commit (fire-after-commit, at-least-once).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
