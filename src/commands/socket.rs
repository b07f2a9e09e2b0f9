//! WebSocket endpoint: one connection is one broadcaster session.
//!
//! Clients send `{"action": "subscribe" | "unsubscribe", "scope": ...}` or
//! `{"action": "ping"}`; the server answers with frames tagged by `type` and
//! pushes `{"type": "event", "data": <BusEvent>}` for every delivered event.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::{BusEvent, EventBroadcaster, Scope};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientCommand {
    Subscribe { scope: Scope },
    Unsubscribe { scope: Scope },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerFrame<'a> {
    Event(&'a BusEvent),
    Subscribed { scope: Scope },
    Unsubscribed { scope: Scope },
    Pong,
    Error { message: String },
}

pub async fn socket_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let mut handle = state.bus.register(session_id.clone());
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            delivered = handle.recv() => {
                let Some(event) = delivered else {
                    break;
                };
                if let Err(e) = send_frame(&mut sink, &ServerFrame::Event(&event)).await {
                    tracing::debug!(session = %session_id, "socket send failed: {e}");
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_command(&state.bus, &session_id, text.as_str());
                        if let Err(e) = send_frame(&mut sink, &reply).await {
                            tracing::debug!(session = %session_id, "socket send failed: {e}");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Pings are answered by axum; binary frames carry nothing we understand.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(session = %session_id, "socket read failed: {e}");
                        break;
                    }
                }
            }
        }
    }

    state.bus.deregister(&session_id);
}

/// Apply one client frame to the session's subscriptions and build the reply.
pub fn handle_command(bus: &EventBroadcaster, session_id: &str, raw: &str) -> ServerFrame<'static> {
    let command = match serde_json::from_str::<ClientCommand>(raw) {
        Ok(command) => command,
        Err(e) => {
            return ServerFrame::Error {
                message: format!("malformed command: {e}"),
            }
        }
    };

    let result = match command {
        ClientCommand::Subscribe { scope } => bus
            .subscribe(session_id, scope.clone())
            .map(|_| ServerFrame::Subscribed { scope }),
        ClientCommand::Unsubscribe { scope } => bus
            .unsubscribe(session_id, &scope)
            .map(|_| ServerFrame::Unsubscribed { scope }),
        ClientCommand::Ping => Ok(ServerFrame::Pong),
    };

    result.unwrap_or_else(|e| ServerFrame::Error {
        message: e.to_string(),
    })
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame<'_>,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn reply(bus: &EventBroadcaster, session: &str, raw: &str) -> Value {
        serde_json::to_value(handle_command(bus, session, raw)).unwrap()
    }

    #[test]
    fn test_subscribe_command_acknowledged() {
        let bus = EventBroadcaster::default();
        let _handle = bus.register("s1");

        let frame = reply(&bus, "s1", r#"{"action":"subscribe","scope":"complaint:42"}"#);
        assert_eq!(frame, json!({ "type": "subscribed", "data": { "scope": "complaint:42" } }));
        assert!(bus.sessions().scopes("s1").unwrap().contains(&Scope::complaint("42")));

        let frame = reply(&bus, "s1", r#"{"action":"unsubscribe","scope":"complaint:42"}"#);
        assert_eq!(frame["type"], "unsubscribed");
        assert!(bus.sessions().scopes("s1").unwrap().is_empty());
    }

    #[test]
    fn test_ping_gets_pong() {
        let bus = EventBroadcaster::default();
        assert_eq!(reply(&bus, "s1", r#"{"action":"ping"}"#), json!({ "type": "pong" }));
    }

    #[test]
    fn test_bad_frames_produce_error_frames() {
        let bus = EventBroadcaster::default();
        let _handle = bus.register("s1");

        for raw in [
            "not json",
            r#"{"action":"dance"}"#,
            r#"{"action":"subscribe","scope":"everything"}"#,
        ] {
            let frame = reply(&bus, "s1", raw);
            assert_eq!(frame["type"], "error", "frame for {raw}");
            assert!(frame["data"]["message"].is_string());
        }
        assert!(bus.sessions().scopes("s1").unwrap().is_empty());
    }

    #[test]
    fn test_command_for_vanished_session_reports_error() {
        let bus = EventBroadcaster::default();
        let frame = reply(&bus, "gone", r#"{"action":"subscribe","scope":"global"}"#);
        assert_eq!(frame["type"], "error");
    }
}
