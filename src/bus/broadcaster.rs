use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use super::sessions::{SessionHandle, SessionManager};
use super::{BusError, BusEvent, DeliveryFailure, DomainEvent, Scope};
use crate::db::now_timestamp;

/// In-process publish/subscribe hub between request handlers and connected
/// sockets. One instance per process, built by the composition root.
pub struct EventBroadcaster {
    sessions: Arc<SessionManager>,
    /// Next sequence number. Held for the whole fan-out so that every
    /// session sees events in publish order.
    next_seq: Mutex<u64>,
}

impl EventBroadcaster {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            next_seq: Mutex::new(0),
        }
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self::new(Arc::new(SessionManager::new(queue_capacity)))
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn register(&self, session_id: impl Into<String>) -> SessionHandle {
        self.sessions.register(session_id)
    }

    pub fn deregister(&self, session_id: &str) -> bool {
        self.sessions.deregister(session_id)
    }

    pub fn subscribe(&self, session_id: &str, scope: Scope) -> Result<bool, BusError> {
        self.sessions.subscribe(session_id, scope)
    }

    pub fn unsubscribe(&self, session_id: &str, scope: &Scope) -> Result<bool, BusError> {
        self.sessions.unsubscribe(session_id, scope)
    }

    /// Hand `event` to every session subscribed to its scope and return how
    /// many accepted it. Never waits on a client; per-session failures are
    /// logged and swallowed here.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let scope = event.scope();
        let kind = event.kind();

        let outcome = {
            let mut next_seq = self.next_seq.lock().unwrap_or_else(PoisonError::into_inner);
            let envelope = Arc::new(BusEvent {
                id: Uuid::new_v4().to_string(),
                seq: *next_seq,
                scope: scope.clone(),
                event,
                created_at: now_timestamp(),
            });
            *next_seq += 1;
            self.sessions.fan_out(&scope, &envelope)
        };

        for (session_id, failure) in &outcome.failures {
            match failure {
                DeliveryFailure::Lagging => {
                    tracing::warn!(session = %session_id, %scope, kind, "{failure}, event dropped for this session");
                }
                DeliveryFailure::Disconnected => {
                    tracing::debug!(session = %session_id, %scope, kind, "{failure}");
                    self.sessions.remove_if_closed(session_id);
                }
            }
        }

        tracing::trace!(%scope, kind, delivered = outcome.delivered, "event published");
        outcome.delivered
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(Arc::new(SessionManager::default()))
    }
}
