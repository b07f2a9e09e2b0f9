//! Event, scope and envelope types carried by the broadcaster.
//!
//! Single source of truth for which scope each domain event is routed to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::BusError;
use crate::db::queries::{ComplaintRow, MessageRow};

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

pub const SCOPE_GLOBAL: &str = "global";
pub const SCOPE_COMPLAINT_PREFIX: &str = "complaint:";

/// Routing key for delivery: everyone watching the complaint list, or the
/// chat channel of one complaint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    Global,
    Complaint(String),
}

impl Scope {
    pub fn complaint(id: impl Into<String>) -> Self {
        Scope::Complaint(id.into())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str(SCOPE_GLOBAL),
            Scope::Complaint(id) => write!(f, "{SCOPE_COMPLAINT_PREFIX}{id}"),
        }
    }
}

impl FromStr for Scope {
    type Err = BusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw == SCOPE_GLOBAL {
            return Ok(Scope::Global);
        }
        match raw.strip_prefix(SCOPE_COMPLAINT_PREFIX) {
            Some(id) if !id.trim().is_empty() => Ok(Scope::Complaint(id.trim().to_string())),
            _ => Err(BusError::InvalidScope(raw.to_string())),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = BusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

// ---------------------------------------------------------------------------
// Domain events
// ---------------------------------------------------------------------------

/// A durable state change worth telling connected clients about. Only
/// published after the corresponding write has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum DomainEvent {
    ComplaintCreated(ComplaintRow),
    ComplaintUpdated(ComplaintRow),
    ComplaintDeleted { id: String },
    MessageSent(MessageRow),
}

impl DomainEvent {
    /// Lifecycle events go to every global subscriber; chat messages only to
    /// the complaint's own channel.
    pub fn scope(&self) -> Scope {
        match self {
            DomainEvent::ComplaintCreated(_)
            | DomainEvent::ComplaintUpdated(_)
            | DomainEvent::ComplaintDeleted { .. } => Scope::Global,
            DomainEvent::MessageSent(message) => Scope::complaint(message.complaint_id.clone()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::ComplaintCreated(_) => "complaintCreated",
            DomainEvent::ComplaintUpdated(_) => "complaintUpdated",
            DomainEvent::ComplaintDeleted { .. } => "complaintDeleted",
            DomainEvent::MessageSent(_) => "messageSent",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// What a session actually receives. `seq` increases by one per publish
/// across the whole process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub seq: u64,
    pub scope: Scope,
    pub event: DomainEvent,
    pub created_at: String,
}
