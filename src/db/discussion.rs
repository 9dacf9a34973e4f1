//! Discussion log operations
//!
//! Entries are append-only; the only delete is the cascade when a parent is
//! purged.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::models::{DiscussionEntry, ParentRef};
use crate::error::DeskError;

/// Append an entry
pub fn insert_entry(
    conn: &Connection,
    parent: &ParentRef,
    author: &str,
    body: &str,
    created_at: DateTime<Utc>,
) -> Result<DiscussionEntry, DeskError> {
    conn.execute(
        "INSERT INTO discussion_entries (parent_kind, parent_key, author, body, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![parent.kind(), parent.key(), author, body, created_at],
    )?;

    Ok(DiscussionEntry {
        id: conn.last_insert_rowid(),
        parent: *parent,
        author: author.to_string(),
        body: body.to_string(),
        created_at,
    })
}

/// Entries for a parent in canonical order: timestamp, then insertion
pub fn list_entries(conn: &Connection, parent: &ParentRef) -> Result<Vec<DiscussionEntry>, DeskError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM discussion_entries
         WHERE parent_kind = ? AND parent_key = ?
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![parent.kind(), parent.key()], |row| {
        DiscussionEntry::from_row(row)
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DeskError::from)
}

/// Remove every entry of a parent; returns how many went
pub fn delete_for_parent(conn: &Connection, parent: &ParentRef) -> Result<usize, DeskError> {
    let deleted = conn.execute(
        "DELETE FROM discussion_entries WHERE parent_kind = ? AND parent_key = ?",
        params![parent.kind(), parent.key()],
    )?;
    Ok(deleted)
}

#[cfg(test)]
fn count_for_parent(conn: &Connection, parent: &ParentRef) -> Result<u64, DeskError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM discussion_entries WHERE parent_kind = ? AND parent_key = ?",
        params![parent.kind(), parent.key()],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}
