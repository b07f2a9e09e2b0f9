//! HTTP and socket entry points.

pub mod assignments;
pub mod auth;
pub mod complaints;
pub mod messages;
pub mod socket;
pub mod users;

use std::time::Duration;

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the full route table around `state`.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());

    Router::new()
        // auth
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // complaints
        .route(
            "/complaints",
            post(complaints::create_complaint).get(complaints::list_complaints),
        )
        .route(
            "/complaints/{id}",
            get(complaints::get_complaint)
                .put(complaints::update_complaint)
                .delete(complaints::delete_complaint),
        )
        // assignments
        .route(
            "/assigned",
            post(assignments::assign_agent).get(assignments::list_assignments),
        )
        .route("/assigned/agent/{agent_id}", get(assignments::list_agent_assignments))
        // messages
        .route("/messages", post(messages::send_message))
        .route("/messages/{complaint_id}", get(messages::list_messages))
        // users
        .route("/users", get(users::list_users))
        .route("/users/{id}", delete(users::delete_user))
        // realtime
        .route("/ws", get(socket::socket_upgrade))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(value) => AllowOrigin::exact(value),
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.bus.sessions().session_count(),
    }))
}
