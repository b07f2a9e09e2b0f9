//! Broadcaster and session registry tests.
//!
//! These tests verify:
//! - Scope routing of lifecycle and chat events
//! - Per-scope publish ordering
//! - Isolation of slow and vanished sessions from the publisher and each other
//! - Registry consistency under concurrent register/deregister/publish

#[cfg(test)]
pub mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::time::timeout;

    use crate::bus::{BusEvent, DomainEvent, EventBroadcaster, Scope, SessionHandle, SessionManager};
    use crate::testing::{complaint_row, message_row, title_of};

    async fn next(handle: &mut SessionHandle) -> Arc<BusEvent> {
        timeout(Duration::from_secs(2), handle.recv())
            .await
            .expect("event within deadline")
            .expect("session still open")
    }

    // ====================================================================================
    // ROUTING
    // ====================================================================================

    #[tokio::test]
    async fn test_global_subscriber_receives_complaint_created() {
        let bus = EventBroadcaster::default();
        let mut a = bus.register("a");
        bus.subscribe("a", Scope::Global).unwrap();

        let complaint = complaint_row("pothole");
        assert_eq!(bus.publish(DomainEvent::ComplaintCreated(complaint.clone())), 1);

        let delivered = next(&mut a).await;
        assert_eq!(delivered.scope, Scope::Global);
        match &delivered.event {
            DomainEvent::ComplaintCreated(row) => {
                assert_eq!(row.id, complaint.id);
                assert_eq!(row.fields.get("title").and_then(|v| v.as_str()), Some("pothole"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let wire = serde_json::to_value(delivered.as_ref()).unwrap();
        assert_eq!(wire["event"]["kind"], "complaintCreated");
        assert_eq!(title_of(&wire["event"]["payload"]), Some("pothole"));
    }

    #[tokio::test]
    async fn test_chat_message_only_reaches_complaint_subscribers() {
        let bus = EventBroadcaster::default();
        let mut b = bus.register("b");
        let mut c = bus.register("c");
        bus.subscribe("b", Scope::Global).unwrap();
        bus.subscribe("c", Scope::complaint("42")).unwrap();

        let delivered = bus.publish(DomainEvent::MessageSent(message_row("42", "hello")));
        assert_eq!(delivered, 1);

        let event = next(&mut c).await;
        assert_eq!(event.scope, Scope::complaint("42"));
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_events_skip_chat_only_sessions() {
        let bus = EventBroadcaster::default();
        let mut chat_only = bus.register("chat");
        bus.subscribe("chat", Scope::complaint("1")).unwrap();

        assert_eq!(bus.publish(DomainEvent::ComplaintDeleted { id: "1".into() }), 0);
        assert!(chat_only.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBroadcaster::default();
        let _idle = bus.register("idle");
        assert_eq!(bus.publish(DomainEvent::ComplaintCreated(complaint_row("x"))), 0);
    }

    #[tokio::test]
    async fn test_unsubscribed_session_stops_receiving() {
        let bus = EventBroadcaster::default();
        let mut a = bus.register("a");
        bus.subscribe("a", Scope::Global).unwrap();

        bus.publish(DomainEvent::ComplaintDeleted { id: "1".into() });
        assert!(bus.unsubscribe("a", &Scope::Global).unwrap());
        bus.publish(DomainEvent::ComplaintDeleted { id: "2".into() });

        let first = next(&mut a).await;
        assert_eq!(first.event, DomainEvent::ComplaintDeleted { id: "1".into() });
        assert!(a.try_recv().is_none());
    }

    // ====================================================================================
    // ORDERING
    // ====================================================================================

    #[tokio::test]
    async fn test_same_scope_events_arrive_in_publish_order() {
        let bus = EventBroadcaster::default();
        let mut handles: Vec<_> = (0..3)
            .map(|i| {
                let id = format!("s{i}");
                let handle = bus.register(id.clone());
                bus.subscribe(&id, Scope::complaint("7")).unwrap();
                handle
            })
            .collect();

        let sent: Vec<String> = (0..50)
            .map(|i| {
                let row = message_row("7", &format!("msg {i}"));
                let id = row.id.clone();
                bus.publish(DomainEvent::MessageSent(row));
                id
            })
            .collect();

        for handle in &mut handles {
            let mut received = Vec::new();
            let mut last_seq = None;
            for _ in 0..sent.len() {
                let event = next(handle).await;
                if let Some(prev) = last_seq {
                    assert!(event.seq > prev, "seq must increase");
                }
                last_seq = Some(event.seq);
                match &event.event {
                    DomainEvent::MessageSent(row) => received.push(row.id.clone()),
                    other => panic!("unexpected event {other:?}"),
                }
            }
            assert_eq!(received, sent);
        }
    }

    #[tokio::test]
    async fn test_sequence_spans_all_scopes() {
        let bus = EventBroadcaster::default();
        let mut a = bus.register("a");
        bus.subscribe("a", Scope::Global).unwrap();
        bus.subscribe("a", Scope::complaint("9")).unwrap();

        bus.publish(DomainEvent::ComplaintCreated(complaint_row("one")));
        bus.publish(DomainEvent::MessageSent(message_row("9", "two")));
        bus.publish(DomainEvent::ComplaintDeleted { id: "9".into() });

        let seqs: Vec<u64> = vec![next(&mut a).await.seq, next(&mut a).await.seq, next(&mut a).await.seq];
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    // ====================================================================================
    // FAILURE ISOLATION
    // ====================================================================================

    #[tokio::test]
    async fn test_vanished_session_does_not_affect_others() {
        let bus = EventBroadcaster::default();
        let mut alive = bus.register("alive");
        let gone = bus.register("gone");
        bus.subscribe("alive", Scope::Global).unwrap();
        bus.subscribe("gone", Scope::Global).unwrap();

        drop(gone);
        let delivered = bus.publish(DomainEvent::ComplaintCreated(complaint_row("pothole")));

        assert_eq!(delivered, 1);
        assert!(matches!(next(&mut alive).await.event, DomainEvent::ComplaintCreated(_)));
        assert!(!bus.sessions().is_registered("gone"));
        assert!(!bus.deregister("gone"));
    }

    #[tokio::test]
    async fn test_lagging_session_drops_only_its_own_events() {
        let bus = EventBroadcaster::new(Arc::new(SessionManager::new(2)));
        let mut slow = bus.register("slow");
        let mut fast = bus.register("fast");
        bus.subscribe("slow", Scope::Global).unwrap();
        bus.subscribe("fast", Scope::Global).unwrap();

        for i in 0..5 {
            bus.publish(DomainEvent::ComplaintDeleted { id: i.to_string() });
            let event = next(&mut fast).await;
            assert_eq!(event.event, DomainEvent::ComplaintDeleted { id: i.to_string() });
        }

        let mut slow_ids = Vec::new();
        while let Some(event) = slow.try_recv() {
            if let DomainEvent::ComplaintDeleted { id } = &event.event {
                slow_ids.push(id.clone());
            }
        }
        assert_eq!(slow_ids, vec!["0".to_string(), "1".to_string()]);
        assert!(bus.sessions().is_registered("slow"), "lagging is not a disconnect");
    }

    #[tokio::test]
    async fn test_deregistered_handle_sees_end_of_stream() {
        let bus = EventBroadcaster::default();
        let mut handle = bus.register("s");
        assert!(bus.deregister("s"));
        let ended = timeout(Duration::from_secs(2), handle.recv()).await.unwrap();
        assert!(ended.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reregistration_racing_publish_keeps_new_session() {
        let bus = Arc::new(EventBroadcaster::default());

        for round in 0..500 {
            let id = format!("x{round}");
            let stale = bus.register(id.clone());
            bus.subscribe(&id, Scope::Global).unwrap();
            drop(stale);

            let reconnect = {
                let bus = bus.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    let handle = bus.register(id.clone());
                    bus.subscribe(&id, Scope::Global).unwrap();
                    handle
                })
            };
            bus.publish(DomainEvent::ComplaintDeleted { id: round.to_string() });
            let _handle = reconnect.await.unwrap();

            assert!(bus.sessions().is_registered(&id), "round {round} lost its live session");
            bus.deregister(&id);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_churn_during_publish_never_reaches_publisher() {
        let bus = Arc::new(EventBroadcaster::default());
        let mut steady = bus.register("steady");
        bus.subscribe("steady", Scope::Global).unwrap();

        let churn = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    let id = format!("churn-{i}");
                    let handle = bus.register(id.clone());
                    bus.subscribe(&id, Scope::Global).unwrap();
                    if i % 2 == 0 {
                        drop(handle);
                    } else {
                        bus.deregister(&id);
                        bus.deregister(&id);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    bus.publish(DomainEvent::ComplaintDeleted { id: i.to_string() });
                    tokio::task::yield_now().await;
                }
            })
        };

        churn.await.unwrap();
        publisher.await.unwrap();

        for i in 0..100 {
            let event = next(&mut steady).await;
            assert_eq!(event.event, DomainEvent::ComplaintDeleted { id: i.to_string() });
        }
    }
}
