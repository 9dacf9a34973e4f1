//! Row models for the desk tables
//!
//! Enums are stored as snake_case TEXT, severity as INTEGER, timestamps as
//! ISO 8601 TEXT (UTC, so lexical order is chronological) and dates as
//! `YYYY-MM-DD`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::auth::{ParseEnumError, Role};
use crate::error::DeskError;

// ============================================================================
// Helpers
// ============================================================================

/// Current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Account ids are the trimmed, lower-cased identifier
pub fn normalize_identifier(identifier: &str) -> Result<String, DeskError> {
    let id = identifier.trim().to_lowercase();
    if id.is_empty() {
        return Err(DeskError::InvalidInput("identifier is required".into()));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(DeskError::InvalidInput(format!(
            "identifier '{}' must not contain whitespace",
            id
        )));
    }
    Ok(id)
}

/// Reject missing or blank required text
pub fn require_text(field: &str, value: &str) -> Result<(), DeskError> {
    if value.trim().is_empty() {
        return Err(DeskError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ParseEnumError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum_sql!(Role);
text_enum_sql!(ApprovalStatus);
text_enum_sql!(TicketStatus);

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Account row
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    /// Opaque seal produced by the credential verifier
    #[serde(skip_serializing)]
    pub credential: String,
    pub role: Role,
    pub approval: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            display_name: row.get("display_name")?,
            credential: row.get("credential")?,
            role: row.get("role")?,
            approval: row.get("approval")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Role the policy should see: Pending until approved
    pub fn effective_role(&self) -> Role {
        match self.approval {
            ApprovalStatus::Approved => self.role,
            ApprovalStatus::Pending => Role::Pending,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }
}

// ============================================================================
// Tickets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Resolved,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(TicketStatus::Open),
            "resolved" => Ok(TicketStatus::Resolved),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Ticket severity, an ordinal from 1 (lowest) to 10 (highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, DeskError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DeskError::InvalidInput(format!(
                "severity must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Severity {
    type Error = DeskError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Severity::new(value)
    }
}

impl From<Severity> for u8 {
    fn from(s: Severity) -> u8 {
        s.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for Severity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.0)))
    }
}

impl FromSql for Severity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        u8::try_from(raw)
            .ok()
            .and_then(|v| Severity::new(v).ok())
            .ok_or(FromSqlError::OutOfRange(raw))
    }
}

/// Ticket row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub assignee: Option<String>,
    pub status: TicketStatus,
    pub unread: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            category: row.get("category")?,
            title: row.get("title")?,
            body: row.get("body")?,
            severity: row.get("severity")?,
            assignee: row.get("assignee")?,
            status: row.get("status")?,
            unread: row.get("unread")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for creating a ticket
#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub category: String,
    pub title: String,
    pub body: String,
    pub severity: Severity,
    #[serde(default)]
    pub assignee: Option<String>,
}

impl NewTicket {
    pub fn validate(&self) -> Result<(), DeskError> {
        require_text("category", &self.category)?;
        require_text("title", &self.title)?;
        require_text("body", &self.body)?;
        Ok(())
    }
}

/// Per-category counts for the channel list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub open: u64,
    pub resolved: u64,
    pub unread: u64,
}

// ============================================================================
// Discussion
// ============================================================================

/// What a discussion entry hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum ParentRef {
    Ticket(i64),
    Calendar(NaiveDate),
}

impl ParentRef {
    pub fn kind(&self) -> &'static str {
        match self {
            ParentRef::Ticket(_) => "ticket",
            ParentRef::Calendar(_) => "calendar",
        }
    }

    /// Storage key within the kind
    pub fn key(&self) -> String {
        match self {
            ParentRef::Ticket(id) => id.to_string(),
            ParentRef::Calendar(date) => date.format("%Y-%m-%d").to_string(),
        }
    }

    fn from_parts(kind: &str, key: &str) -> Option<Self> {
        match kind {
            "ticket" => key.parse().ok().map(ParentRef::Ticket),
            "calendar" => NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .ok()
                .map(ParentRef::Calendar),
            _ => None,
        }
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

/// Discussion entry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscussionEntry {
    pub id: i64,
    pub parent: ParentRef,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl DiscussionEntry {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let kind: String = row.get("parent_kind")?;
        let key: String = row.get("parent_key")?;
        let parent = ParentRef::from_parts(&kind, &key).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(ParseEnumError(format!("{}:{}", kind, key))),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            parent,
            author: row.get("author")?,
            body: row.get("body")?,
            created_at: row.get("created_at")?,
        })
    }
}

// ============================================================================
// Calendar
// ============================================================================

/// Lead-editable calendar fields. An upsert writes all of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarInput {
    /// 24h `HH:MM`
    pub time: String,
    #[serde(default)]
    pub timezone: Option<String>,
    pub location: String,
    pub mission_body: String,
}

impl CalendarInput {
    pub fn validate(&self) -> Result<(), DeskError> {
        NaiveTime::parse_from_str(self.time.trim(), "%H:%M").map_err(|_| {
            DeskError::InvalidInput(format!("time '{}' is not HH:MM", self.time))
        })?;
        if let Some(tz) = &self.timezone {
            require_text("timezone", tz)?;
        }
        require_text("location", &self.location)?;
        require_text("mission_body", &self.mission_body)?;
        Ok(())
    }
}

/// Calendar entry with its attendance roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    pub date: NaiveDate,
    pub time: String,
    pub timezone: Option<String>,
    pub location: String,
    pub mission_body: String,
    pub attendance: BTreeSet<String>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl CalendarEntry {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            date: row.get("date")?,
            time: row.get("time")?,
            timezone: row.get("timezone")?,
            location: row.get("location")?,
            mission_body: row.get("mission_body")?,
            attendance: BTreeSet::new(),
            updated_by: row.get("updated_by")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Member-facing projection without audit fields
    pub fn briefing(&self) -> CalendarBriefing<'_> {
        CalendarBriefing {
            date: self.date,
            time: &self.time,
            timezone: self.timezone.as_deref(),
            location: &self.location,
            mission_body: &self.mission_body,
            attending: self.attendance.len(),
        }
    }
}

/// Read-only view of a calendar entry for non-editing roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarBriefing<'a> {
    pub date: NaiveDate,
    pub time: &'a str,
    pub timezone: Option<&'a str>,
    pub location: &'a str,
    pub mission_body: &'a str,
    pub attending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(
            normalize_identifier("  Root@Example.ORG ").unwrap(),
            "root@example.org"
        );
        assert!(normalize_identifier("   ").is_err());
        assert!(normalize_identifier("two words@example.org").is_err());
    }

    #[test]
    fn test_severity_bounds() {
        assert!(Severity::new(0).is_err());
        assert!(Severity::new(11).is_err());
        assert_eq!(Severity::new(8).unwrap().value(), 8);
        assert!(Severity::new(9).unwrap() > Severity::new(2).unwrap());

        let parsed: Result<Severity, _> = serde_json::from_str("12");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parent_ref_keys() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(ParentRef::Calendar(date).to_string(), "calendar:2025-03-01");
        assert_eq!(ParentRef::Ticket(42).key(), "42");
        assert_eq!(
            ParentRef::from_parts("calendar", "2025-03-01"),
            Some(ParentRef::Calendar(date))
        );
        assert_eq!(ParentRef::from_parts("ticket", "x"), None);
        assert_eq!(ParentRef::from_parts("wiki", "1"), None);
    }

    #[test]
    fn test_calendar_input_validation() {
        let input = CalendarInput {
            time: "20:00".into(),
            timezone: None,
            location: "Discord".into(),
            mission_body: "CQB drills".into(),
        };
        assert!(input.validate().is_ok());

        let bad_time = CalendarInput {
            time: "8pm".into(),
            ..input.clone()
        };
        assert!(matches!(bad_time.validate(), Err(DeskError::InvalidInput(_))));

        let blank_body = CalendarInput {
            mission_body: "  ".into(),
            ..input
        };
        assert!(blank_body.validate().is_err());
    }

    #[test]
    fn test_new_ticket_requires_body() {
        let ticket = NewTicket {
            category: "ServerAdmin".into(),
            title: "Broken Spawn".into(),
            body: String::new(),
            severity: Severity::new(8).unwrap(),
            assignee: Some("opA".into()),
        };
        assert!(ticket.validate().is_err());
    }
}
