//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures (missing references,
/// illegal status transitions, stock shortfalls, malformed input).
/// Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced variant, warehouse, order, line, allocation or party
    /// does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested status change is not reachable from the current state.
    /// Includes same-status requests and terminal-state mutation attempts.
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// A decrease or reservation exceeded the available quantity.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Structurally invalid input (e.g. a transfer onto itself, a receive
    /// without a warehouse, a non-positive quantity).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_transition(
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransition(format!("cannot transition from {from} to {to}"))
    }

    /// Same-status request rejection.
    pub fn already_in_status(status: impl core::fmt::Display) -> Self {
        Self::InvalidTransition(format!("already in status {status}"))
    }

    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
