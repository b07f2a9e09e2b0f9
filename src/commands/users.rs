//! User administration commands (Admin only)

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::db::queries;
use crate::{AppError, AppState, UserView};

pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<UserView>>, AppError> {
    identity.require_admin()?;

    let users = state
        .store(|db| Ok(queries::list_users(db)?))
        .await?
        .into_iter()
        .map(UserView::from)
        .collect();
    Ok(Json(users))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    identity.require_admin()?;

    if id == identity.user_id {
        return Err(AppError::Validation("admins cannot delete themselves".to_string()));
    }
    let target = id.clone();
    let removed = state
        .store(move |db| Ok(queries::delete_user(db, &target)?))
        .await?;
    if !removed {
        return Err(AppError::NotFound(format!("user not found: {id}")));
    }

    tracing::info!(user = %id, by = %identity.user_id, "user deleted");
    Ok(Json(json!({ "message": "User deleted successfully" })))
}
