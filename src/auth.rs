//! Bearer-token sessions and role checks.
//!
//! Tokens are random 32-byte strings handed out at signup/login. Only their
//! SHA-256 digest is stored, so a leaked database does not leak live tokens.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{Duration, SecondsFormat, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::{now_timestamp, queries, Database};
use crate::{AppError, AppState};

// ---------------------------------------------------------------------------
// Roles and identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Agent,
    Ordinary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Agent => "Agent",
            Role::Ordinary => "Ordinary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "Admin" => Ok(Role::Admin),
            "Agent" => Ok(Role::Agent),
            "Ordinary" => Ok(Role::Ordinary),
            other => Err(AppError::Validation(format!("unknown user type: {other}"))),
        }
    }
}

/// Who is making the request, as attached by the session validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub name: String,
    pub role: Role,
}

impl Identity {
    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_any(&[Role::Admin])
    }

    pub fn require_any(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "access denied for role {}",
                self.role
            )))
        }
    }
}

impl TryFrom<queries::UserRow> for Identity {
    type Error = AppError;

    fn try_from(row: queries::UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: row.user_type.parse()?,
            user_id: row.id,
            name: row.name,
        })
    }
}

// ---------------------------------------------------------------------------
// Validator seam
// ---------------------------------------------------------------------------

/// Turns a presented bearer token into an identity. Fails closed.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Identity, AppError>;
}

/// Validates tokens against the `auth_tokens` table.
pub struct DbSessionValidator {
    db: Arc<Database>,
}

impl DbSessionValidator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionValidator for DbSessionValidator {
    async fn validate(&self, token: &str) -> Result<Identity, AppError> {
        let db = self.db.clone();
        let token_hash = hash_token(token);
        let user = tokio::task::spawn_blocking(move || {
            queries::get_user_for_token(&db, &token_hash, &now_timestamp())
        })
        .await
        .map_err(|e| AppError::Other(format!("token lookup failed: {e}")))??
        .ok_or_else(|| AppError::Unauthorized("invalid or expired token".to_string()))?;
        Identity::try_from(user)
    }
}

/// Extractor for handlers that need an authenticated caller.
pub struct AuthUser(pub Identity);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("expected a bearer token".to_string()))?;

        let identity = state.validator.validate(token).await?;
        Ok(AuthUser(identity))
    }
}

// ---------------------------------------------------------------------------
// Credentials and tokens
// ---------------------------------------------------------------------------

pub fn new_salt() -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    STANDARD.encode(salt)
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Compare without an early exit so timing does not reveal the matching prefix.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn verify_password(password: &str, user: &queries::UserRow) -> bool {
    let candidate = hash_password(password, &user.password_salt);
    constant_time_eq(candidate.as_bytes(), user.password_hash.as_bytes())
}

pub fn hash_token(token: &str) -> String {
    STANDARD.encode(Sha256::digest(token.as_bytes()))
}

/// Mint a token for `user_id`, store its digest, and return the raw token.
pub fn issue_token(db: &Database, user_id: &str, ttl_hours: i64) -> Result<String, AppError> {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let token = URL_SAFE_NO_PAD.encode(raw);

    let now = Utc::now();
    let now_text = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let pruned = queries::delete_expired_tokens(db, &now_text)?;
    if pruned > 0 {
        tracing::debug!("pruned {pruned} expired auth tokens");
    }

    let expires_at = (now + Duration::hours(ttl_hours.max(1))).to_rfc3339_opts(SecondsFormat::Millis, true);
    queries::insert_auth_token(
        db,
        &hash_token(&token),
        user_id,
        &now_text,
        &expires_at,
    )?;
    Ok(token)
}
