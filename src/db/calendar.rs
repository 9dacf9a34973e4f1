//! Calendar entry and attendance operations

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{CalendarEntry, CalendarInput};
use crate::error::DeskError;

/// Get the entry for a date, with its roster
pub fn get_entry(conn: &Connection, date: NaiveDate) -> Result<Option<CalendarEntry>, DeskError> {
    let entry = conn
        .query_row(
            "SELECT * FROM calendar_entries WHERE date = ?",
            params![date],
            |row| CalendarEntry::from_row(row),
        )
        .optional()?;

    match entry {
        Some(mut entry) => {
            entry.attendance = get_attendance(conn, date)?;
            Ok(Some(entry))
        }
        None => Ok(None),
    }
}

pub fn entry_exists(conn: &Connection, date: NaiveDate) -> Result<bool, DeskError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM calendar_entries WHERE date = ?)",
        params![date],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Entries between two dates inclusive, ascending. Dates with no entry are
/// simply absent.
pub fn list_range(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<CalendarEntry>, DeskError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM calendar_entries WHERE date BETWEEN ? AND ? ORDER BY date ASC",
    )?;

    let rows = stmt.query_map(params![start, end], |row| CalendarEntry::from_row(row))?;
    let mut entries = rows.collect::<Result<Vec<_>, _>>()?;

    for entry in &mut entries {
        entry.attendance = get_attendance(conn, entry.date)?;
    }

    Ok(entries)
}

/// Insert or wholesale-replace the editable fields for a date. The roster
/// is left alone.
pub fn upsert_entry(
    conn: &Connection,
    date: NaiveDate,
    input: &CalendarInput,
    updated_by: &str,
    updated_at: DateTime<Utc>,
) -> Result<(), DeskError> {
    conn.execute(
        "INSERT INTO calendar_entries (date, time, timezone, location, mission_body, updated_by, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(date) DO UPDATE SET
            time = excluded.time,
            timezone = excluded.timezone,
            location = excluded.location,
            mission_body = excluded.mission_body,
            updated_by = excluded.updated_by,
            updated_at = excluded.updated_at",
        params![
            date,
            input.time.trim(),
            input.timezone.as_deref().map(str::trim),
            input.location,
            input.mission_body,
            updated_by,
            updated_at,
        ],
    )?;
    Ok(())
}

/// Delete an entry and its roster; returns false when absent
pub fn delete_entry(conn: &Connection, date: NaiveDate) -> Result<bool, DeskError> {
    conn.execute("DELETE FROM calendar_attendance WHERE date = ?", params![date])?;
    let deleted = conn.execute("DELETE FROM calendar_entries WHERE date = ?", params![date])?;
    Ok(deleted > 0)
}

/// Add to the roster. True only when the account was not already on it.
pub fn add_attendee(
    conn: &Connection,
    date: NaiveDate,
    account_id: &str,
    responded_at: DateTime<Utc>,
) -> Result<bool, DeskError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO calendar_attendance (date, account_id, responded_at) VALUES (?, ?, ?)",
        params![date, account_id, responded_at],
    )?;
    Ok(inserted > 0)
}

/// Remove from the roster. True only when the account was on it.
pub fn remove_attendee(conn: &Connection, date: NaiveDate, account_id: &str) -> Result<bool, DeskError> {
    let deleted = conn.execute(
        "DELETE FROM calendar_attendance WHERE date = ? AND account_id = ?",
        params![date, account_id],
    )?;
    Ok(deleted > 0)
}

fn get_attendance(conn: &Connection, date: NaiveDate) -> Result<BTreeSet<String>, DeskError> {
    let mut stmt = conn.prepare("SELECT account_id FROM calendar_attendance WHERE date = ?")?;
    let rows = stmt.query_map(params![date], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<BTreeSet<_>, _>>().map_err(DeskError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DeskDb;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn input(body: &str) -> CalendarInput {
        CalendarInput {
            time: "20:00".into(),
            timezone: Some("UTC".into()),
            location: "Discord".into(),
            mission_body: body.into(),
        }
    }

    #[test]
    fn test_upsert_replaces_fields_and_keeps_roster() {
        let db = DeskDb::open_in_memory().unwrap();

        db.with_tx(None, |tx| {
            upsert_entry(tx, day(1), &input("CQB drills"), "lead", Utc::now())?;
            add_attendee(tx, day(1), "opa", Utc::now())?;
            upsert_entry(
                tx,
                day(1),
                &CalendarInput {
                    timezone: None,
                    ..input("Convoy escort")
                },
                "lead2",
                Utc::now(),
            )
        })
        .unwrap();

        let entry = db.with_conn(None, |conn| get_entry(conn, day(1))).unwrap().unwrap();
        assert_eq!(entry.mission_body, "Convoy escort");
        assert_eq!(entry.timezone, None);
        assert_eq!(entry.updated_by, "lead2");
        assert!(entry.attendance.contains("opa"));
    }

    #[test]
    fn test_range_is_inclusive_and_sparse() {
        let db = DeskDb::open_in_memory().unwrap();
        db.with_tx(None, |tx| {
            for d in [1, 3, 5] {
                upsert_entry(tx, day(d), &input("op"), "lead", Utc::now())?;
            }
            Ok(())
        })
        .unwrap();

        let dates: Vec<_> = db
            .with_conn(None, |conn| list_range(conn, day(1), day(3)))
            .unwrap()
            .into_iter()
            .map(|e| e.date)
            .collect();
        assert_eq!(dates, [day(1), day(3)]);
    }

    #[test]
    fn test_attendee_set_semantics() {
        let db = DeskDb::open_in_memory().unwrap();
        db.with_tx(None, |tx| upsert_entry(tx, day(2), &input("op"), "lead", Utc::now()))
            .unwrap();

        let first = db.with_tx(None, |tx| add_attendee(tx, day(2), "opa", Utc::now())).unwrap();
        let second = db.with_tx(None, |tx| add_attendee(tx, day(2), "opa", Utc::now())).unwrap();
        assert!(first);
        assert!(!second);

        assert!(db.with_tx(None, |tx| remove_attendee(tx, day(2), "opa")).unwrap());
        assert!(!db.with_tx(None, |tx| remove_attendee(tx, day(2), "opa")).unwrap());
    }
}
