//! Unread tracker views for privileged viewers
//!
//! Clearing happens in `TicketService::get`; this service only reports.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::{ensure, AccessPolicy};
use crate::context::RequestContext;
use crate::db::tickets::{self, TicketQuery};
use crate::db::{DeskDb, Ticket};
use crate::error::DeskError;

pub struct NotificationService {
    db: Arc<DeskDb>,
    policy: Arc<AccessPolicy>,
}

impl NotificationService {
    pub fn new(db: Arc<DeskDb>, policy: Arc<AccessPolicy>) -> Self {
        Self { db, policy }
    }

    /// Unread tickets, optionally narrowed to one category
    pub fn unread(&self, ctx: &RequestContext, category: Option<&str>) -> Result<Vec<Ticket>, DeskError> {
        self.ensure_privileged(ctx)?;

        let query = TicketQuery {
            category: category.map(|c| c.trim().to_string()),
            status: None,
            unread_only: true,
        };
        self.db.with_conn(ctx.deadline, |conn| tickets::list_tickets(conn, &query))
    }

    /// Unread badge counts keyed by category; categories with nothing
    /// unread are left out
    pub fn unread_counts(&self, ctx: &RequestContext) -> Result<BTreeMap<String, u64>, DeskError> {
        self.ensure_privileged(ctx)?;

        let summaries = self.db.with_conn(ctx.deadline, tickets::category_summaries)?;
        Ok(summaries
            .into_iter()
            .filter(|s| s.unread > 0)
            .map(|s| (s.category, s.unread))
            .collect())
    }

    fn ensure_privileged(&self, ctx: &RequestContext) -> Result<(), DeskError> {
        ensure(
            self.policy.is_privileged_viewer(ctx.role()),
            ctx.role(),
            "view unread notifications",
        )
    }
}
