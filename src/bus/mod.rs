//! Real-time fan-out of complaint and chat events to connected clients.
//!
//! # Architecture
//!
//! Events flow from request handlers → `EventBroadcaster` → session queues →
//! socket writer tasks:
//! - `EventBroadcaster`: stamps each `DomainEvent` with a sequence number and
//!   hands it to every interested session without waiting
//! - `SessionManager`: registry of live sessions and the scopes they follow
//! - `SessionHandle`: receiving end owned by one socket connection
//!
//! Delivery is at most once per session. A client that reconnects re-fetches
//! state over HTTP; nothing here is persisted.

mod broadcaster;
mod event_types;
mod sessions;

use thiserror::Error;

pub use broadcaster::EventBroadcaster;
pub use event_types::{BusEvent, DomainEvent, Scope, SCOPE_COMPLAINT_PREFIX, SCOPE_GLOBAL};
pub use sessions::{SessionHandle, SessionId, SessionManager, DEFAULT_SESSION_QUEUE};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("invalid scope '{0}', expected 'global' or 'complaint:<id>'")]
    InvalidScope(String),
}

/// Why one session missed one event. Never surfaces past the broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    #[error("session queue full")]
    Lagging,
    #[error("session disconnected")]
    Disconnected,
}
