use rusqlite::Connection;

use super::DbError;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
CREATE TABLE users (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    password_hash   TEXT NOT NULL,
    password_salt   TEXT NOT NULL,
    user_type       TEXT NOT NULL DEFAULT 'Ordinary',
    phone           TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE complaints (
    id          TEXT PRIMARY KEY,
    user_id     TEXT REFERENCES users(id) ON DELETE SET NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    fields_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE assignments (
    id            TEXT PRIMARY KEY,
    complaint_id  TEXT NOT NULL REFERENCES complaints(id) ON DELETE CASCADE,
    agent_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    agent_name    TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE messages (
    id                TEXT PRIMARY KEY,
    complaint_id      TEXT NOT NULL REFERENCES complaints(id) ON DELETE CASCADE,
    name              TEXT NOT NULL,
    message           TEXT NOT NULL,
    attachments_json  TEXT NOT NULL DEFAULT '[]',
    sent_at           TEXT NOT NULL
);
"#,
    },
    Migration {
        version: 2,
        sql: r#"
CREATE INDEX idx_complaints_user ON complaints(user_id, created_at);
CREATE INDEX idx_assignments_agent ON assignments(agent_id, created_at);
CREATE INDEX idx_assignments_complaint ON assignments(complaint_id);
CREATE INDEX idx_messages_complaint_sent ON messages(complaint_id, sent_at);
"#,
    },
    Migration {
        version: 3,
        sql: r#"
CREATE TABLE auth_tokens (
    token_hash  TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);

CREATE INDEX idx_auth_tokens_user ON auth_tokens(user_id);
"#,
    },
];

pub(super) fn run_migrations(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );",
    )?;

    let applied: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM _migrations ORDER BY version")?;
        let result = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        result
    };

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!("applying migration v{}", migration.version);

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DbError::Migration(format!("v{}: {e}", migration.version)))?;
        tx.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
            rusqlite::params![migration.version],
        )?;
        tx.commit()?;
    }

    Ok(())
}
