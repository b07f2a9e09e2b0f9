//! Complaint chat commands

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::bus::DomainEvent;
use crate::db::{now_timestamp, queries};
use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub complaint_id: String,
    /// Display name shown in the thread; defaults to the caller's name.
    pub name: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<queries::Attachment>,
}

fn validate_attachment(attachment: &queries::Attachment) -> Result<(), AppError> {
    if attachment.name.trim().is_empty() || attachment.path.trim().is_empty() {
        return Err(AppError::Validation(
            "attachment name and path are required".to_string(),
        ));
    }
    let path = attachment.path.replace('\\', "/");
    if path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
        return Err(AppError::Validation(format!(
            "attachment path must be relative to the upload store: {}",
            attachment.path
        )));
    }
    Ok(())
}

pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<queries::MessageRow>), AppError> {
    let complaint_id = request.complaint_id.trim();
    if complaint_id.is_empty() {
        return Err(AppError::Validation("complaint_id is required".to_string()));
    }

    let message = request.message.trim();
    if message.is_empty() && request.attachments.is_empty() {
        return Err(AppError::Validation(
            "message cannot be empty without attachments".to_string(),
        ));
    }
    for attachment in &request.attachments {
        validate_attachment(attachment)?;
    }

    let lookup = complaint_id.to_string();
    let exists = state
        .store(move |db| Ok(queries::get_complaint(db, &lookup)?.is_some()))
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("complaint not found: {complaint_id}")));
    }

    let name = request
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or(identity.name);

    let row = queries::MessageRow {
        id: Uuid::new_v4().to_string(),
        complaint_id: complaint_id.to_string(),
        name,
        message: message.to_string(),
        attachments: request.attachments,
        sent_at: now_timestamp(),
    };
    let stored = row.clone();
    state
        .store(move |db| Ok(queries::insert_message(db, &stored)?))
        .await?;

    state.bus.publish(DomainEvent::MessageSent(row.clone()));
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
    Path(complaint_id): Path<String>,
) -> Result<Json<Vec<queries::MessageRow>>, AppError> {
    let rows = state
        .store(move |db| Ok(queries::list_messages_for_complaint(db, &complaint_id)?))
        .await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, path: &str) -> queries::Attachment {
        queries::Attachment {
            name: name.to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn test_attachment_paths_stay_inside_store() {
        assert!(validate_attachment(&attachment("a.png", "uploads/a.png")).is_ok());
        assert!(validate_attachment(&attachment("a.png", "uploads\\a.png")).is_ok());
        assert!(validate_attachment(&attachment("a.png", "/etc/passwd")).is_err());
        assert!(validate_attachment(&attachment("a.png", "uploads/../../secret")).is_err());
        assert!(validate_attachment(&attachment("", "uploads/a.png")).is_err());
    }
}
