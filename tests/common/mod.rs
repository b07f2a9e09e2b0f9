// tests/common/mod.rs
//! Common test utilities for the HTTP integration tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use resolvedesk_lib::config::Config;
use resolvedesk_lib::db::Database;
use resolvedesk_lib::{commands, AppState};

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    /// App over an in-memory database that lets the first admin sign up.
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().expect("in-memory DB"));
        let config = Config {
            allow_admin_signup: true,
            ..Config::default()
        };
        let state = AppState::new(db, config);
        let router = commands::router(state.clone());
        Self { state, router }
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
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

        let response = self.router.clone().oneshot(request).await.expect("infallible router");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    /// Sign up a user and return `(user_id, token)`.
    pub async fn signup(&self, name: &str, user_type: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/signup",
                None,
                Some(json!({
                    "name": name,
                    "email": format!("{name}@example.com"),
                    "password": "correct horse",
                    "user_type": user_type,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup {name}: {body}");
        (
            body["user"]["id"].as_str().expect("user id").to_string(),
            body["token"].as_str().expect("token").to_string(),
        )
    }
}
