//! Calendar service - mission calendar and attendance
//!
//! One entry per date. Leads (and SuperAdmin) edit; every approved role
//! reads and RSVPs for themselves.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use crate::auth::{ensure, AccessPolicy, ResourceKind};
use crate::config::MAX_CALENDAR_WINDOW_DAYS;
use crate::context::RequestContext;
use crate::db::models::{current_timestamp, normalize_identifier};
use crate::db::{accounts, calendar, discussion, CalendarEntry, CalendarInput, DeskDb, ParentRef};
use crate::error::DeskError;

use super::events::{DeskEvent, EventBus};

/// Calendar service
pub struct CalendarService {
    db: Arc<DeskDb>,
    policy: Arc<AccessPolicy>,
    events: Arc<EventBus>,
    window_days: u32,
}

impl CalendarService {
    pub fn new(
        db: Arc<DeskDb>,
        policy: Arc<AccessPolicy>,
        events: Arc<EventBus>,
        window_days: u32,
    ) -> Self {
        Self {
            db,
            policy,
            events,
            window_days: window_days.clamp(1, MAX_CALENDAR_WINDOW_DAYS),
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, ctx: &RequestContext, date: NaiveDate) -> Result<CalendarEntry, DeskError> {
        self.ensure_read(ctx)?;
        self.db
            .with_conn(ctx.deadline, |conn| calendar::get_entry(conn, date))?
            .ok_or_else(|| not_found(date))
    }

    /// Entries between `start` and `end` inclusive; empty when `start > end`
    pub fn list_range(
        &self,
        ctx: &RequestContext,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarEntry>, DeskError> {
        self.ensure_read(ctx)?;
        if start > end {
            return Ok(Vec::new());
        }
        self.db.with_conn(ctx.deadline, |conn| calendar::list_range(conn, start, end))
    }

    /// The configured window of days starting at `from`
    pub fn upcoming(&self, ctx: &RequestContext, from: NaiveDate) -> Result<Vec<CalendarEntry>, DeskError> {
        let end = from
            .checked_add_signed(Duration::days(i64::from(self.window_days) - 1))
            .unwrap_or(NaiveDate::MAX);
        self.list_range(ctx, from, end)
    }

    fn ensure_read(&self, ctx: &RequestContext) -> Result<(), DeskError> {
        ensure(
            self.policy.can_read(ctx.role(), ResourceKind::Calendar),
            ctx.role(),
            "view the calendar",
        )
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create or wholesale-replace the entry for `date`
    pub fn upsert(
        &self,
        ctx: &RequestContext,
        date: NaiveDate,
        input: CalendarInput,
    ) -> Result<CalendarEntry, DeskError> {
        ensure(
            self.policy.can_write(ctx.role(), ResourceKind::Calendar),
            ctx.role(),
            "edit the calendar",
        )?;
        input.validate()?;

        let entry = self.db.with_tx(ctx.deadline, |tx| {
            calendar::upsert_entry(tx, date, &input, ctx.actor_id(), current_timestamp())?;
            calendar::get_entry(tx, date)?
                .ok_or_else(|| DeskError::Internal("Failed to retrieve calendar entry".into()))
        })?;

        info!(date = %date, by = %ctx.actor_id(), "Calendar entry saved");
        self.events.emit(DeskEvent::CalendarUpdated {
            date,
            by: ctx.actor_id().to_string(),
        });

        Ok(entry)
    }

    /// Delete a day with its roster and discussion
    pub fn remove(&self, ctx: &RequestContext, date: NaiveDate) -> Result<(), DeskError> {
        ensure(
            self.policy.can_write(ctx.role(), ResourceKind::Calendar),
            ctx.role(),
            "edit the calendar",
        )?;

        let messages_removed = self.db.with_tx(ctx.deadline, |tx| {
            let removed = discussion::delete_for_parent(tx, &ParentRef::Calendar(date))?;
            if !calendar::delete_entry(tx, date)? {
                return Err(not_found(date));
            }
            Ok(removed)
        })?;

        info!(date = %date, messages_removed, by = %ctx.actor_id(), "Calendar entry removed");
        self.events.emit(DeskEvent::CalendarRemoved { date, messages_removed });

        Ok(())
    }

    /// Add `account_id` to the roster; a repeat RSVP is a no-op
    pub fn rsvp(&self, ctx: &RequestContext, date: NaiveDate, account_id: &str) -> Result<CalendarEntry, DeskError> {
        self.set_attendance(ctx, date, account_id, true)
    }

    /// Take `account_id` off the roster; a no-op when absent
    pub fn withdraw(
        &self,
        ctx: &RequestContext,
        date: NaiveDate,
        account_id: &str,
    ) -> Result<CalendarEntry, DeskError> {
        self.set_attendance(ctx, date, account_id, false)
    }

    fn set_attendance(
        &self,
        ctx: &RequestContext,
        date: NaiveDate,
        account_id: &str,
        attending: bool,
    ) -> Result<CalendarEntry, DeskError> {
        self.ensure_read(ctx)?;
        let account_id = normalize_identifier(account_id)?;

        // Answering for someone else is a calendar edit
        if account_id != ctx.actor_id() {
            ensure(
                self.policy.can_write(ctx.role(), ResourceKind::Calendar),
                ctx.role(),
                "change another account's attendance",
            )?;
        }

        let (entry, changed) = self.db.with_tx(ctx.deadline, |tx| {
            if !calendar::entry_exists(tx, date)? {
                return Err(not_found(date));
            }
            if accounts::get_account(tx, &account_id)?.is_none() {
                return Err(DeskError::NotFound(format!("Account {} not found", account_id)));
            }

            let changed = if attending {
                calendar::add_attendee(tx, date, &account_id, current_timestamp())?
            } else {
                calendar::remove_attendee(tx, date, &account_id)?
            };

            let entry = calendar::get_entry(tx, date)?.ok_or_else(|| not_found(date))?;
            Ok((entry, changed))
        })?;

        if changed {
            debug!(date = %date, account = %account_id, attending, "Attendance changed");
            self.events.emit(DeskEvent::AttendanceChanged {
                date,
                account_id,
                attending,
            });
        }

        Ok(entry)
    }
}

fn not_found(date: NaiveDate) -> DeskError {
    DeskError::NotFound(format!("No calendar entry for {}", date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::context::Actor;
    use crate::db::{Account, ApprovalStatus};

    fn service() -> CalendarService {
        let db = Arc::new(DeskDb::open_in_memory().unwrap());
        db.with_tx(None, |tx| {
            for id in ["opa", "opb"] {
                accounts::insert_account(
                    tx,
                    &Account {
                        id: id.into(),
                        display_name: id.to_uppercase(),
                        credential: String::new(),
                        role: Role::Member,
                        approval: ApprovalStatus::Approved,
                        created_at: current_timestamp(),
                    },
                )?;
            }
            Ok(())
        })
        .unwrap();

        CalendarService::new(db, Arc::new(AccessPolicy::default()), Arc::new(EventBus::new()), 14)
    }

    fn ctx(id: &str, role: Role) -> RequestContext {
        RequestContext::new(Actor::new(id, role))
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cqb() -> CalendarInput {
        CalendarInput {
            time: "20:00".into(),
            timezone: Some("UTC".into()),
            location: "Discord".into(),
            mission_body: "CQB drills".into(),
        }
    }

    #[test]
    fn test_upcoming_stops_at_last_representable_date() {
        let svc = service();
        svc.upsert(&ctx("lead", Role::Lead), day(2025, 3, 1), cqb()).unwrap();

        let member = ctx("opa", Role::Member);
        assert!(svc.upcoming(&member, NaiveDate::MAX).unwrap().is_empty());
        assert!(svc.upcoming(&member, NaiveDate::MAX.pred_opt().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let db = Arc::new(DeskDb::open_in_memory().unwrap());
        let svc = CalendarService::new(
            db,
            Arc::new(AccessPolicy::default()),
            Arc::new(EventBus::new()),
            u32::MAX,
        );
        let lead = ctx("lead", Role::Lead);
        svc.upsert(&lead, day(2025, 3, 1), cqb()).unwrap();
        svc.upsert(&lead, day(2026, 3, 2), cqb()).unwrap();

        let entries = svc.upcoming(&lead, day(2025, 3, 1)).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_upsert_then_get_returns_last_write() {
        let svc = service();
        let lead = ctx("lead", Role::Lead);
        let date = day(2025, 3, 1);

        svc.upsert(&lead, date, cqb()).unwrap();
        let second = CalendarInput {
            time: "21:30".into(),
            timezone: None,
            location: "TeamSpeak".into(),
            mission_body: "Convoy escort".into(),
        };
        svc.upsert(&lead, date, second.clone()).unwrap();

        let entry = svc.get(&ctx("opa", Role::Member), date).unwrap();
        assert_eq!(entry.time, second.time);
        assert_eq!(entry.timezone, None);
        assert_eq!(entry.location, second.location);
        assert_eq!(entry.mission_body, second.mission_body);
    }

    #[test]
    fn test_edit_requires_lead_tier() {
        let svc = service();
        let date = day(2025, 3, 1);

        for role in [Role::Member, Role::Admin, Role::Pending] {
            assert!(svc.upsert(&ctx("x", role), date, cqb()).unwrap_err().is_forbidden());
        }
        assert!(svc.upsert(&ctx("root", Role::SuperAdmin), date, cqb()).is_ok());
        assert!(svc.remove(&ctx("opa", Role::Member), date).unwrap_err().is_forbidden());
    }

    #[test]
    fn test_invalid_input_rejected() {
        let svc = service();
        let bad = CalendarInput {
            time: "25:00".into(),
            ..cqb()
        };
        assert!(matches!(
            svc.upsert(&ctx("lead", Role::Lead), day(2025, 3, 1), bad),
            Err(DeskError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_range_and_window() {
        let svc = service();
        let lead = ctx("lead", Role::Lead);
        svc.upsert(&lead, day(2025, 3, 1), cqb()).unwrap();
        svc.upsert(&lead, day(2025, 3, 14), cqb()).unwrap();
        svc.upsert(&lead, day(2025, 3, 15), cqb()).unwrap();

        let member = ctx("opa", Role::Member);
        let range = svc.list_range(&member, day(2025, 2, 28), day(2025, 3, 2)).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].date, day(2025, 3, 1));

        assert!(svc.list_range(&member, day(2025, 3, 2), day(2025, 2, 28)).unwrap().is_empty());

        let dates: Vec<_> = svc
            .upcoming(&member, day(2025, 3, 1))
            .unwrap()
            .into_iter()
            .map(|e| e.date)
            .collect();
        assert_eq!(dates, [day(2025, 3, 1), day(2025, 3, 14)]);
    }

    #[test]
    fn test_rsvp_set_semantics() {
        let svc = service();
        let date = day(2025, 3, 1);
        svc.upsert(&ctx("lead", Role::Lead), date, cqb()).unwrap();

        let opa = ctx("opa", Role::Member);
        svc.rsvp(&opa, date, "opa").unwrap();
        let entry = svc.rsvp(&opa, date, "OPA").unwrap();
        assert_eq!(entry.attendance.iter().filter(|a| *a == "opa").count(), 1);
        assert_eq!(entry.attendance.len(), 1);

        // Roster survives an upsert
        let entry = svc.upsert(&ctx("lead", Role::Lead), date, cqb()).unwrap();
        assert!(entry.attendance.contains("opa"));

        let entry = svc.withdraw(&opa, date, "opa").unwrap();
        assert!(entry.attendance.is_empty());
        assert!(svc.withdraw(&opa, date, "opa").unwrap().attendance.is_empty());
    }

    #[test]
    fn test_rsvp_errors() {
        let svc = service();
        let date = day(2025, 3, 1);
        let opa = ctx("opa", Role::Member);

        assert!(matches!(svc.rsvp(&opa, date, "opa"), Err(DeskError::NotFound(_))));

        svc.upsert(&ctx("lead", Role::Lead), date, cqb()).unwrap();
        assert!(svc.rsvp(&opa, date, "opb").unwrap_err().is_forbidden());
        assert!(matches!(
            svc.rsvp(&ctx("lead", Role::Lead), date, "ghost"),
            Err(DeskError::NotFound(_))
        ));
        assert!(svc.rsvp(&ctx("lead", Role::Lead), date, "opb").is_ok());
    }

    #[test]
    fn test_remove_cascades() {
        let svc = service();
        let date = day(2025, 3, 1);
        let lead = ctx("lead", Role::Lead);
        svc.upsert(&lead, date, cqb()).unwrap();
        svc.rsvp(&ctx("opa", Role::Member), date, "opa").unwrap();
        svc.db
            .with_tx(None, |tx| {
                discussion::insert_entry(tx, &ParentRef::Calendar(date), "opa", "bringing smokes", current_timestamp())
            })
            .unwrap();

        svc.remove(&lead, date).unwrap();

        let stats = svc.db.stats().unwrap();
        assert_eq!(stats.calendar_count, 0);
        assert_eq!(stats.discussion_count, 0);
        assert!(matches!(svc.remove(&lead, date), Err(DeskError::NotFound(_))));
    }
}
