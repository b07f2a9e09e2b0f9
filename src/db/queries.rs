use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Database, DbError};

// ---------------------------------------------------------------------------
// Row types: flat structs that map directly to table columns
// ---------------------------------------------------------------------------

/// Stored user. Carries the credential columns, so it is never serialized;
/// handlers convert it into `UserView` before it leaves the process.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub user_type: String,
    pub phone: Option<String>,
    pub created_at: String,
}

/// Complaint with its submitter-supplied fields flattened into the JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintRow {
    pub id: String,
    pub user_id: Option<String>,
    pub status: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub id: String,
    pub complaint_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub created_at: String,
}

/// Reference to a file held by the upload store. Bytes never pass through here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub complaint_id: String,
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub sent_at: String,
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ---------------------------------------------------------------------------
// User queries
// ---------------------------------------------------------------------------

const USER_COLUMNS: &str =
    "id, name, email, password_hash, password_salt, user_type, phone, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        password_salt: row.get(4)?,
        user_type: row.get(5)?,
        phone: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn insert_user(db: &Database, row: &UserRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, password_salt, user_type, phone, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.id,
            row.name,
            row.email,
            row.password_hash,
            row.password_salt,
            row.user_type,
            row.phone,
            row.created_at
        ],
    )?;
    Ok(())
}

pub fn get_user(db: &Database, id: &str) -> Result<Option<UserRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn get_user_by_email(db: &Database, email: &str) -> Result<Option<UserRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
            params![email],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_users(db: &Database) -> Result<Vec<UserRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, rowid ASC"
    ))?;
    let rows = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns `false` when no user had that id.
pub fn delete_user(db: &Database, id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// ---------------------------------------------------------------------------
// Auth token queries
// ---------------------------------------------------------------------------

pub fn insert_auth_token(
    db: &Database,
    token_hash: &str,
    user_id: &str,
    created_at: &str,
    expires_at: &str,
) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO auth_tokens (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![token_hash, user_id, created_at, expires_at],
    )?;
    Ok(())
}

/// Resolve a token hash to its owner, ignoring tokens that expired before `now`.
pub fn get_user_for_token(
    db: &Database,
    token_hash: &str,
    now: &str,
) -> Result<Option<UserRow>, DbError> {
    let conn = db.conn();
    let row = conn
        .query_row(
            "SELECT u.id, u.name, u.email, u.password_hash, u.password_salt, u.user_type, u.phone, u.created_at
             FROM auth_tokens t
             INNER JOIN users u ON u.id = t.user_id
             WHERE t.token_hash = ?1 AND t.expires_at > ?2",
            params![token_hash, now],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn delete_expired_tokens(db: &Database, now: &str) -> Result<usize, DbError> {
    let conn = db.conn();
    let removed = conn.execute("DELETE FROM auth_tokens WHERE expires_at <= ?1", params![now])?;
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Complaint queries
// ---------------------------------------------------------------------------

const COMPLAINT_COLUMNS: &str = "id, user_id, status, fields_json, created_at, updated_at";

fn complaint_from_row(row: &Row<'_>) -> rusqlite::Result<ComplaintRow> {
    Ok(ComplaintRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: row.get(2)?,
        fields: json_column(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn select_complaint(conn: &Connection, id: &str) -> Result<Option<ComplaintRow>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = ?1"),
            params![id],
            complaint_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn insert_complaint(db: &Database, row: &ComplaintRow) -> Result<(), DbError> {
    let fields_json = serde_json::to_string(&row.fields)?;
    let conn = db.conn();
    conn.execute(
        "INSERT INTO complaints (id, user_id, status, fields_json, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id,
            row.user_id,
            row.status,
            fields_json,
            row.created_at,
            row.updated_at
        ],
    )?;
    Ok(())
}

/// List complaints newest first, optionally only those filed by `user_id`.
pub fn list_complaints(db: &Database, user_id: Option<&str>) -> Result<Vec<ComplaintRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints
         WHERE ?1 IS NULL OR user_id = ?1
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt
        .query_map(params![user_id], complaint_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_complaint(db: &Database, id: &str) -> Result<Option<ComplaintRow>, DbError> {
    let conn = db.conn();
    select_complaint(&conn, id)
}

/// Merge `patch` into the stored fields (a `null` value removes the key),
/// optionally replace the status, and return the updated row. `None` when the
/// complaint does not exist.
pub fn update_complaint(
    db: &Database,
    id: &str,
    status: Option<&str>,
    patch: &Map<String, Value>,
    updated_at: &str,
) -> Result<Option<ComplaintRow>, DbError> {
    let conn = db.conn();
    let tx = conn.unchecked_transaction()?;

    let Some(mut row) = select_complaint(&tx, id)? else {
        return Ok(None);
    };

    for (key, value) in patch {
        if value.is_null() {
            row.fields.remove(key);
        } else {
            row.fields.insert(key.clone(), value.clone());
        }
    }
    if let Some(status) = status {
        row.status = status.to_string();
    }
    row.updated_at = updated_at.to_string();

    tx.execute(
        "UPDATE complaints SET status = ?1, fields_json = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            row.status,
            serde_json::to_string(&row.fields)?,
            row.updated_at,
            row.id
        ],
    )?;
    tx.commit()?;
    Ok(Some(row))
}

/// Returns `false` when no complaint had that id.
pub fn delete_complaint(db: &Database, id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute("DELETE FROM complaints WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// ---------------------------------------------------------------------------
// Assignment queries
// ---------------------------------------------------------------------------

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<AssignmentRow> {
    Ok(AssignmentRow {
        id: row.get(0)?,
        complaint_id: row.get(1)?,
        agent_id: row.get(2)?,
        agent_name: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert_assignment(db: &Database, row: &AssignmentRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO assignments (id, complaint_id, agent_id, agent_name, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.id,
            row.complaint_id,
            row.agent_id,
            row.agent_name,
            row.created_at
        ],
    )?;
    Ok(())
}

pub fn list_assignments(db: &Database) -> Result<Vec<AssignmentRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, complaint_id, agent_id, agent_name, created_at FROM assignments ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map([], assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_assignments_for_agent(db: &Database, agent_id: &str) -> Result<Vec<AssignmentRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, complaint_id, agent_id, agent_name, created_at FROM assignments WHERE agent_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![agent_id], assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Message queries
// ---------------------------------------------------------------------------

pub fn insert_message(db: &Database, row: &MessageRow) -> Result<(), DbError> {
    let attachments_json = serde_json::to_string(&row.attachments)?;
    let conn = db.conn();
    conn.execute(
        "INSERT INTO messages (id, complaint_id, name, message, attachments_json, sent_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id,
            row.complaint_id,
            row.name,
            row.message,
            attachments_json,
            row.sent_at
        ],
    )?;
    Ok(())
}

/// Chat transcript for one complaint, oldest first. Messages sharing a
/// timestamp keep their insertion order.
pub fn list_messages_for_complaint(db: &Database, complaint_id: &str) -> Result<Vec<MessageRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, complaint_id, name, message, attachments_json, sent_at
         FROM messages
         WHERE complaint_id = ?1
         ORDER BY sent_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![complaint_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                complaint_id: row.get(1)?,
                name: row.get(2)?,
                message: row.get(3)?,
                attachments: json_column(row, 4)?,
                sent_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
