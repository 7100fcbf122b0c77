//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the **transport** for events after the owning transaction has
//! committed. It makes minimal assumptions:
//!
//! - **Transport-agnostic**: in-memory channels, broker clients, etc.
//! - **At-least-once**: publication may be retried after a failure; consumers
//!   must be idempotent.
//! - **No persistence**: the ledger and aggregates are the source of truth,
//!   the bus only distributes notifications.
//!
//! A publish failure never rolls back the committed state change; the caller
//! logs it and moves on.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription receives a copy of every message published to the bus
/// (broadcast semantics). Subscriptions are designed for single-threaded
/// consumption; spread work behind a channel if more consumers are needed.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// Implementations must be safe to share across threads; multiple commands
/// may publish concurrently once their transactions have committed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
