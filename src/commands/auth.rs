//! Signup, login and current-identity commands

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AuthUser, Identity, Role};
use crate::db::{now_timestamp, queries};
use crate::{AppError, AppState, UserView};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub user_type: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let name = request.name.trim();
    let email = request.email.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation(format!("invalid email: {email}")));
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let role = match request.user_type.as_deref() {
        Some(raw) => raw.parse::<Role>()?,
        None => Role::Ordinary,
    };
    if role == Role::Admin && !state.config.allow_admin_signup {
        return Err(AppError::Forbidden(
            "admin accounts cannot be created through signup".to_string(),
        ));
    }

    let salt = auth::new_salt();
    let row = queries::UserRow {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        password_hash: auth::hash_password(&request.password, &salt),
        password_salt: salt,
        user_type: role.as_str().to_string(),
        phone: request.phone.filter(|p| !p.trim().is_empty()),
        created_at: now_timestamp(),
    };

    let ttl_hours = state.config.token_ttl_hours;
    let stored = row.clone();
    let token = state
        .store(move |db| {
            if queries::get_user_by_email(db, &stored.email)?.is_some() {
                return Err(AppError::Conflict(format!(
                    "email already registered: {}",
                    stored.email
                )));
            }
            queries::insert_user(db, &stored)?;
            auth::issue_token(db, &stored.id, ttl_hours)
        })
        .await?;
    tracing::info!(user = %row.id, role = %role, "user signed up");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: row.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let ttl_hours = state.config.token_ttl_hours;
    let (user, token) = state
        .store(move |db| {
            let user = queries::get_user_by_email(db, request.email.trim())?
                .filter(|user| auth::verify_password(&request.password, user))
                .ok_or_else(|| AppError::Unauthorized("invalid email or password".to_string()))?;
            let token = auth::issue_token(db, &user.id, ttl_hours)?;
            Ok((user, token))
        })
        .await?;
    tracing::debug!(user = %user.id, "user logged in");

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

pub async fn me(AuthUser(identity): AuthUser) -> Json<Identity> {
    Json(identity)
}
