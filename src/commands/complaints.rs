use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::bus::DomainEvent;
use crate::db::{now_timestamp, queries};
use crate::{AppError, AppState};

pub const DEFAULT_STATUS: &str = "pending";

/// Keys the server owns; clients cannot set them through the free-form body.
const RESERVED_KEYS: &[&str] = &["id", "user_id", "created_at", "updated_at"];

#[derive(Debug, Default, Deserialize)]
pub struct ListComplaintsQuery {
    pub user_id: Option<String>,
}

/// Split a request body into the optional status and the free-form fields.
fn split_body(mut body: Map<String, Value>) -> Result<(Option<String>, Map<String, Value>), AppError> {
    for key in RESERVED_KEYS {
        body.remove(*key);
    }

    let status = match body.remove("status") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(other) => {
            return Err(AppError::Validation(format!(
                "status must be a non-empty string, got {other}"
            )))
        }
    };

    Ok((status, body))
}

pub async fn create_complaint(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<queries::ComplaintRow>), AppError> {
    let (status, fields) = split_body(body)?;
    if fields.is_empty() {
        return Err(AppError::Validation("complaint has no fields".to_string()));
    }

    let now = now_timestamp();
    let row = queries::ComplaintRow {
        id: Uuid::new_v4().to_string(),
        user_id: Some(identity.user_id),
        status: status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        fields,
        created_at: now.clone(),
        updated_at: now,
    };
    let stored = row.clone();
    state
        .store(move |db| Ok(queries::insert_complaint(db, &stored)?))
        .await?;

    state.bus.publish(DomainEvent::ComplaintCreated(row.clone()));
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn list_complaints(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
    Query(query): Query<ListComplaintsQuery>,
) -> Result<Json<Vec<queries::ComplaintRow>>, AppError> {
    let user_id = query.user_id.filter(|id| !id.trim().is_empty());
    let rows = state
        .store(move |db| Ok(queries::list_complaints(db, user_id.as_deref())?))
        .await?;
    Ok(Json(rows))
}

pub async fn get_complaint(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<queries::ComplaintRow>, AppError> {
    let lookup = id.clone();
    state
        .store(move |db| Ok(queries::get_complaint(db, &lookup)?))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("complaint not found: {id}")))
}

pub async fn update_complaint(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<queries::ComplaintRow>, AppError> {
    identity.require_any(&[Role::Admin, Role::Agent])?;

    let (status, patch) = split_body(body)?;
    let target = id.clone();
    let updated = state
        .store(move |db| {
            Ok(queries::update_complaint(db, &target, status.as_deref(), &patch, &now_timestamp())?)
        })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("complaint not found: {id}")))?;

    tracing::debug!(complaint = %id, by = %identity.user_id, status = %updated.status, "complaint updated");
    state.bus.publish(DomainEvent::ComplaintUpdated(updated.clone()));
    Ok(Json(updated))
}

pub async fn delete_complaint(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    identity.require_admin()?;

    let target = id.clone();
    let removed = state
        .store(move |db| Ok(queries::delete_complaint(db, &target)?))
        .await?;
    if !removed {
        return Err(AppError::NotFound(format!("complaint not found: {id}")));
    }

    tracing::info!(complaint = %id, by = %identity.user_id, "complaint deleted");
    state.bus.publish(DomainEvent::ComplaintDeleted { id });
    Ok(Json(json!({ "message": "Complaint deleted successfully" })))
}
