//! Discussion service - append-only threads on tickets and calendar days

use std::sync::Arc;

use rusqlite::Connection;
use tracing::debug;

use crate::auth::{ensure, AccessPolicy, ResourceKind};
use crate::context::RequestContext;
use crate::db::models::current_timestamp;
use crate::db::{calendar, discussion, tickets, DeskDb, DiscussionEntry, ParentRef};
use crate::error::DeskError;

use super::events::{DeskEvent, EventBus};

/// Discussion service
pub struct DiscussionService {
    db: Arc<DeskDb>,
    policy: Arc<AccessPolicy>,
    events: Arc<EventBus>,
}

impl DiscussionService {
    pub fn new(db: Arc<DeskDb>, policy: Arc<AccessPolicy>, events: Arc<EventBus>) -> Self {
        Self { db, policy, events }
    }

    /// Append a message as the acting account
    pub fn post(
        &self,
        ctx: &RequestContext,
        parent: ParentRef,
        body: &str,
    ) -> Result<DiscussionEntry, DeskError> {
        ensure(
            self.policy.can_write(ctx.role(), ResourceKind::Discussion),
            ctx.role(),
            "post messages",
        )?;
        if body.trim().is_empty() {
            return Err(DeskError::EmptyMessage);
        }

        let entry = self.db.with_tx(ctx.deadline, |tx| {
            require_parent(tx, &parent)?;
            discussion::insert_entry(tx, &parent, ctx.actor_id(), body, current_timestamp())
        })?;

        debug!(parent = %parent, entry_id = entry.id, "Posted message");
        self.events.emit(DeskEvent::MessagePosted {
            parent,
            entry_id: entry.id,
            author: entry.author.clone(),
        });

        Ok(entry)
    }

    /// Messages on a parent, oldest first
    pub fn list_for(&self, ctx: &RequestContext, parent: ParentRef) -> Result<Vec<DiscussionEntry>, DeskError> {
        ensure(
            self.policy.can_read(ctx.role(), ResourceKind::Discussion),
            ctx.role(),
            "read messages",
        )?;

        self.db.with_conn(ctx.deadline, |conn| {
            require_parent(conn, &parent)?;
            discussion::list_entries(conn, &parent)
        })
    }
}

fn require_parent(conn: &Connection, parent: &ParentRef) -> Result<(), DeskError> {
    let exists = match parent {
        ParentRef::Ticket(id) => tickets::get_ticket(conn, *id)?.is_some(),
        ParentRef::Calendar(date) => calendar::entry_exists(conn, *date)?,
    };

    if exists {
        Ok(())
    } else {
        Err(DeskError::NotFound(format!("{} not found", parent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::context::Actor;
    use crate::db::{CalendarInput, NewTicket, Severity};
    use chrono::NaiveDate;

    struct Fixture {
        svc: DiscussionService,
        ticket: ParentRef,
        day: ParentRef,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(DeskDb::open_in_memory().unwrap());
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        let ticket_id = db
            .with_tx(None, |tx| {
                calendar::upsert_entry(
                    tx,
                    date,
                    &CalendarInput {
                        time: "20:00".into(),
                        timezone: None,
                        location: "Discord".into(),
                        mission_body: "CQB drills".into(),
                    },
                    "lead",
                    current_timestamp(),
                )?;
                let ticket = tickets::insert_ticket(
                    tx,
                    &NewTicket {
                        category: "ServerAdmin".into(),
                        title: "Broken Spawn".into(),
                        body: "details".into(),
                        severity: Severity::new(8).unwrap(),
                        assignee: None,
                    },
                    "admin",
                    current_timestamp(),
                )?;
                Ok(ticket.id)
            })
            .unwrap();

        Fixture {
            svc: DiscussionService::new(db, Arc::new(AccessPolicy::default()), Arc::new(EventBus::new())),
            ticket: ParentRef::Ticket(ticket_id),
            day: ParentRef::Calendar(date),
        }
    }

    fn member() -> RequestContext {
        RequestContext::new(Actor::new("opa", Role::Member))
    }

    #[test]
    fn test_post_then_list() {
        let f = fixture();
        assert!(f.svc.list_for(&member(), f.ticket).unwrap().is_empty());

        let entry = f.svc.post(&member(), f.ticket, "investigating").unwrap();
        assert_eq!(entry.author, "opa");

        let listed = f.svc.list_for(&member(), f.ticket).unwrap();
        assert_eq!(listed, vec![entry]);
        assert!(f.svc.list_for(&member(), f.day).unwrap().is_empty());
    }

    #[test]
    fn test_post_errors() {
        let f = fixture();

        assert!(matches!(
            f.svc.post(&member(), f.ticket, "  \n"),
            Err(DeskError::EmptyMessage)
        ));
        assert!(matches!(
            f.svc.post(&member(), ParentRef::Ticket(404), "hello"),
            Err(DeskError::NotFound(_))
        ));

        let missing_day = ParentRef::Calendar(NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert!(matches!(
            f.svc.post(&member(), missing_day, "hello"),
            Err(DeskError::NotFound(_))
        ));

        let pending = RequestContext::new(Actor::new("newbie", Role::Pending));
        assert!(f.svc.post(&pending, f.day, "hello").unwrap_err().is_forbidden());
    }
}
