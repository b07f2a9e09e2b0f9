//! Complaint desk backend library.
//!
//! This is the main entry point for the HTTP/WebSocket backend. It handles:
//! - Application initialization and state management
//! - Route registration
//! - Database setup and migration
//! - Real-time event broadcasting to connected clients
//!
//! # Architecture
//!
//! The backend follows a modular architecture:
//! - `commands`: axum route handlers (HTTP and socket entry points)
//! - `bus`: event broadcaster and client session registry
//! - `db`: database layer with SQLite
//! - `auth`: bearer-token sessions and role checks
//! - `config`: environment-driven configuration

pub mod auth;
pub mod bus;
pub mod commands;
pub mod config;
pub mod db;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use auth::{DbSessionValidator, SessionValidator};
use bus::EventBroadcaster;
use config::Config;
use db::{queries, Database};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Db(#[from] db::DbError),
    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Db(_) | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub bus: Arc<EventBroadcaster>,
    pub validator: Arc<dyn SessionValidator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the default collaborators around an already opened database.
    pub fn new(db: Arc<Database>, config: Config) -> Self {
        let bus = Arc::new(EventBroadcaster::with_queue_capacity(config.session_queue));
        let validator: Arc<dyn SessionValidator> = Arc::new(DbSessionValidator::new(db.clone()));
        Self {
            db,
            bus,
            validator,
            config: Arc::new(config),
        }
    }

    /// Run store work on the blocking pool so SQLite I/O never parks an
    /// async worker.
    pub async fn store<T, F>(&self, work: F) -> Result<T, AppError>
    where
        F: FnOnce(&Database) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || work(&db))
            .await
            .map_err(|e| AppError::Other(format!("store task failed: {e}")))?
    }
}

/// Public view of a user. Credentials never leave the process.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub user_type: String,
    pub phone: Option<String>,
    pub created_at: String,
}

impl From<queries::UserRow> for UserView {
    fn from(value: queries::UserRow) -> Self {
        Self {
            id: value.id,
            name: value.name,
            email: value.email,
            user_type: value.user_type,
            phone: value.phone,
            created_at: value.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Application entry point
// ---------------------------------------------------------------------------

pub async fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resolvedesk_lib=debug,info".parse().expect("valid env filter")),
        )
        .init();

    let config = Config::load();
    std::fs::create_dir_all(&config.data_dir).unwrap_or_else(|e| {
        panic!("failed to create data directory {}: {e}", config.data_dir.display())
    });

    let db = Arc::new(Database::open(config.db_path()).expect("failed to open database"));
    match queries::delete_expired_tokens(&db, &db::now_timestamp()) {
        Ok(0) => {}
        Ok(n) => tracing::info!("pruned {n} expired auth tokens"),
        Err(e) => tracing::warn!("failed to prune expired auth tokens: {e}"),
    }

    let address = config.bind_address();
    let state = AppState::new(db, config);
    let app = commands::router(state);

    tracing::info!("binding to {address}");
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {address}: {e}"));
    tracing::info!("resolvedesk listening on {address}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
    }

    tracing::info!("resolvedesk shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::warn!("failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
