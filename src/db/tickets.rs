//! Ticket CRUD operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{CategorySummary, NewTicket, Ticket, TicketStatus};
use crate::error::DeskError;

/// Query parameters for listing tickets
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub category: Option<String>,
    pub status: Option<TicketStatus>,
    pub unread_only: bool,
}

/// Get ticket by ID
pub fn get_ticket(conn: &Connection, id: i64) -> Result<Option<Ticket>, DeskError> {
    conn.query_row("SELECT * FROM tickets WHERE id = ?", params![id], |row| {
        Ticket::from_row(row)
    })
    .optional()
    .map_err(DeskError::from)
}

/// List tickets, highest severity first, then oldest id first
pub fn list_tickets(conn: &Connection, query: &TicketQuery) -> Result<Vec<Ticket>, DeskError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tickets
         WHERE (?1 IS NULL OR category = ?1)
           AND (?2 IS NULL OR status = ?2)
           AND (?3 = 0 OR unread = 1)
         ORDER BY severity DESC, id ASC",
    )?;

    let rows = stmt.query_map(
        params![query.category, query.status, query.unread_only],
        |row| Ticket::from_row(row),
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DeskError::from)
}

/// Insert a ticket as Open and unread
pub fn insert_ticket(
    conn: &Connection,
    input: &NewTicket,
    created_by: &str,
    created_at: DateTime<Utc>,
) -> Result<Ticket, DeskError> {
    conn.execute(
        "INSERT INTO tickets (category, title, body, severity, assignee, status, unread, created_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
        params![
            input.category.trim(),
            input.title,
            input.body,
            input.severity,
            input.assignee,
            TicketStatus::Open,
            created_by,
            created_at,
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_ticket(conn, id)?
        .ok_or_else(|| DeskError::Internal("Failed to retrieve created ticket".into()))
}

/// Move a ticket to `status`. Returns the number of rows that actually
/// changed; 0 means it was already there (or does not exist).
pub fn set_status(conn: &Connection, id: i64, status: TicketStatus) -> Result<usize, DeskError> {
    let changed = conn.execute(
        "UPDATE tickets SET status = ?1 WHERE id = ?2 AND status != ?1",
        params![status, id],
    )?;
    Ok(changed)
}

/// Clear the unread flag. True only for the call that flipped it.
pub fn clear_unread(conn: &Connection, id: i64) -> Result<bool, DeskError> {
    let changed = conn.execute(
        "UPDATE tickets SET unread = 0 WHERE id = ? AND unread = 1",
        params![id],
    )?;
    Ok(changed > 0)
}

/// Delete a ticket row
pub fn delete_ticket(conn: &Connection, id: i64) -> Result<bool, DeskError> {
    let deleted = conn.execute("DELETE FROM tickets WHERE id = ?", params![id])?;
    Ok(deleted > 0)
}

/// Per-category counts, alphabetical
pub fn category_summaries(conn: &Connection) -> Result<Vec<CategorySummary>, DeskError> {
    let mut stmt = conn.prepare(
        "SELECT category,
                SUM(CASE WHEN status = 'open' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END),
                SUM(unread)
         FROM tickets
         GROUP BY category
         ORDER BY category",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(CategorySummary {
            category: row.get(0)?,
            open: row.get::<_, i64>(1)? as u64,
            resolved: row.get::<_, i64>(2)? as u64,
            unread: row.get::<_, i64>(3)? as u64,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DeskError::from)
}
