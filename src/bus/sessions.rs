use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{BusError, BusEvent, DeliveryFailure, Scope};

pub type SessionId = String;

pub const DEFAULT_SESSION_QUEUE: usize = 256;

struct SessionSlot {
    tx: mpsc::Sender<Arc<BusEvent>>,
    scopes: HashSet<Scope>,
}

/// Receiving end of one registered session. Dropping it makes the next
/// delivery attempt report the session as disconnected.
pub struct SessionHandle {
    id: SessionId,
    rx: mpsc::Receiver<Arc<BusEvent>>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next event. `None` once the session was deregistered or
    /// replaced by a newer registration under the same id.
    pub async fn recv(&mut self) -> Option<Arc<BusEvent>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<BusEvent>> {
        self.rx.try_recv().ok()
    }
}

/// Outcome of handing one event to every interested session.
#[derive(Debug, Default)]
pub(crate) struct FanOut {
    pub delivered: usize,
    pub failures: Vec<(SessionId, DeliveryFailure)>,
}

/// Registry of live client sessions and the scopes each one listens to.
pub struct SessionManager {
    slots: DashMap<SessionId, SessionSlot>,
    queue_capacity: usize,
}

impl SessionManager {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a session with an empty scope set. Re-registering a live id
    /// replaces the previous registration and drops its subscriptions.
    pub fn register(&self, session_id: impl Into<SessionId>) -> SessionHandle {
        let id = session_id.into();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let previous = self.slots.insert(
            id.clone(),
            SessionSlot {
                tx,
                scopes: HashSet::new(),
            },
        );
        if previous.is_some() {
            tracing::debug!(session = %id, "session re-registered, previous subscriptions dropped");
        } else {
            tracing::debug!(session = %id, "session registered");
        }
        SessionHandle { id, rx }
    }

    /// Remove the session from every scope. Returns `false` if it was not
    /// registered, so repeated calls are harmless.
    pub fn deregister(&self, session_id: &str) -> bool {
        let removed = self.slots.remove(session_id).is_some();
        if removed {
            tracing::debug!(session = %session_id, "session deregistered");
        }
        removed
    }

    /// Remove the session only while its stored queue is still closed. A
    /// newer registration under the same id has an open queue and is kept.
    pub(crate) fn remove_if_closed(&self, session_id: &str) -> bool {
        let removed = self
            .slots
            .remove_if(session_id, |_, slot| slot.tx.is_closed())
            .is_some();
        if removed {
            tracing::debug!(session = %session_id, "disconnected session removed");
        }
        removed
    }

    /// Returns `true` if the scope was newly added.
    pub fn subscribe(&self, session_id: &str, scope: Scope) -> Result<bool, BusError> {
        let mut slot = self
            .slots
            .get_mut(session_id)
            .ok_or_else(|| BusError::UnknownSession(session_id.to_string()))?;
        Ok(slot.scopes.insert(scope))
    }

    /// Returns `true` if the scope was present.
    pub fn unsubscribe(&self, session_id: &str, scope: &Scope) -> Result<bool, BusError> {
        let mut slot = self
            .slots
            .get_mut(session_id)
            .ok_or_else(|| BusError::UnknownSession(session_id.to_string()))?;
        Ok(slot.scopes.remove(scope))
    }

    pub fn scopes(&self, session_id: &str) -> Option<HashSet<Scope>> {
        self.slots.get(session_id).map(|slot| slot.scopes.clone())
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.slots.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.slots.len()
    }

    pub fn subscriber_count(&self, scope: &Scope) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.scopes.contains(scope))
            .count()
    }

    /// Try to enqueue `event` for every session subscribed to `scope`. Never
    /// waits: a full or closed queue is recorded as a failure for that
    /// session only.
    pub(crate) fn fan_out(&self, scope: &Scope, event: &Arc<BusEvent>) -> FanOut {
        let mut outcome = FanOut::default();
        for slot in self.slots.iter() {
            if !slot.scopes.contains(scope) {
                continue;
            }
            match slot.tx.try_send(Arc::clone(event)) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => outcome
                    .failures
                    .push((slot.key().clone(), DeliveryFailure::Lagging)),
                Err(TrySendError::Closed(_)) => outcome
                    .failures
                    .push((slot.key().clone(), DeliveryFailure::Disconnected)),
            }
        }
        outcome
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_QUEUE)
    }
}
