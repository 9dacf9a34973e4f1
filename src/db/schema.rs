//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::DeskError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), DeskError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(DeskError::Database(format!(
            "Database schema v{} is newer than supported v{}",
            current_version, SCHEMA_VERSION
        )));
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, DeskError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), DeskError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), DeskError> {
    conn.execute_batch(ACCOUNTS_SCHEMA)?;
    conn.execute_batch(TICKETS_SCHEMA)?;
    conn.execute_batch(DISCUSSION_SCHEMA)?;
    conn.execute_batch(CALENDAR_SCHEMA)?;
    conn.execute_batch(INDEXES_SCHEMA)?;
    Ok(())
}

const ACCOUNTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    credential TEXT NOT NULL,
    role TEXT NOT NULL,
    approval TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

// AUTOINCREMENT keeps ids monotonic across purges
const TICKETS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tickets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    severity INTEGER NOT NULL CHECK (severity BETWEEN 1 AND 10),
    assignee TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    unread INTEGER NOT NULL DEFAULT 1,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const DISCUSSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS discussion_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_kind TEXT NOT NULL,
    parent_key TEXT NOT NULL,
    author TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const CALENDAR_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS calendar_entries (
    date TEXT PRIMARY KEY,
    time TEXT NOT NULL,
    timezone TEXT,
    location TEXT NOT NULL,
    mission_body TEXT NOT NULL,
    updated_by TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS calendar_attendance (
    date TEXT NOT NULL REFERENCES calendar_entries(date) ON DELETE CASCADE,
    account_id TEXT NOT NULL,
    responded_at TEXT NOT NULL,
    PRIMARY KEY (date, account_id)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tickets_category ON tickets(category, status);
CREATE INDEX IF NOT EXISTS idx_tickets_unread ON tickets(unread) WHERE unread = 1;
CREATE INDEX IF NOT EXISTS idx_discussion_parent ON discussion_entries(parent_kind, parent_key, created_at, id);
CREATE INDEX IF NOT EXISTS idx_accounts_approval ON accounts(approval);
"#;
