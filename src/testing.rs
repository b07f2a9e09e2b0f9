//! Test helpers shared by the crate-internal suites.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::auth::{self, Role};
use crate::config::Config;
use crate::db::{now_timestamp, queries, Database};
use crate::AppState;

/// Fresh state over an in-memory database.
pub fn test_state() -> AppState {
    let db = Arc::new(Database::open_in_memory().expect("in-memory DB"));
    AppState::new(db, Config::default())
}

/// Insert a user with `role` and return it with a live bearer token.
pub fn seed_user(state: &AppState, name: &str, role: Role) -> (queries::UserRow, String) {
    let salt = auth::new_salt();
    let row = queries::UserRow {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: format!("{name}-{}@example.com", Uuid::new_v4()),
        password_hash: auth::hash_password("password", &salt),
        password_salt: salt,
        user_type: role.as_str().to_string(),
        phone: None,
        created_at: now_timestamp(),
    };
    queries::insert_user(&state.db, &row).expect("insert user");
    let token = auth::issue_token(&state.db, &row.id, 1).expect("issue token");
    (row, token)
}

pub fn complaint_row(title: &str) -> queries::ComplaintRow {
    let now = now_timestamp();
    let mut fields = Map::new();
    fields.insert("title".to_string(), json!(title));
    queries::ComplaintRow {
        id: Uuid::new_v4().to_string(),
        user_id: None,
        status: "pending".to_string(),
        fields,
        created_at: now.clone(),
        updated_at: now,
    }
}

pub fn message_row(complaint_id: &str, text: &str) -> queries::MessageRow {
    queries::MessageRow {
        id: Uuid::new_v4().to_string(),
        complaint_id: complaint_id.to_string(),
        name: "tester".to_string(),
        message: text.to_string(),
        attachments: Vec::new(),
        sent_at: now_timestamp(),
    }
}

pub fn title_of(value: &Value) -> Option<&str> {
    value.get("title").and_then(Value::as_str)
}

/// Send one request through `app` and decode the JSON reply (`Null` when empty).
pub async fn call(
    app: &axum::Router,
    method: axum::http::Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (axum::http::StatusCode, Value) {
    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::Request;
    use tower::ServiceExt;

    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("valid request");

    let response = app.clone().oneshot(request).await.expect("infallible router");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}
