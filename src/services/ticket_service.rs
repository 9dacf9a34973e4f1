//! Ticket service - business logic for ticket channels
//!
//! Wraps the ticket repository with policy checks, the unread tracker and
//! event emission. Lifecycle is Open <-> Resolved; both transitions are
//! idempotent.

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{ensure, AccessPolicy, ResourceKind};
use crate::context::RequestContext;
use crate::db::models::current_timestamp;
use crate::db::tickets::{self, TicketQuery};
use crate::db::{discussion, CategorySummary, DeskDb, NewTicket, ParentRef, Ticket, TicketStatus};
use crate::error::DeskError;

use super::events::{DeskEvent, EventBus};

/// Ticket service
pub struct TicketService {
    db: Arc<DeskDb>,
    policy: Arc<AccessPolicy>,
    events: Arc<EventBus>,
}

impl TicketService {
    pub fn new(db: Arc<DeskDb>, policy: Arc<AccessPolicy>, events: Arc<EventBus>) -> Self {
        Self { db, policy, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// List tickets, highest severity first
    pub fn list(
        &self,
        ctx: &RequestContext,
        category: Option<&str>,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, DeskError> {
        ensure(self.policy.can_read(ctx.role(), ResourceKind::Ticket), ctx.role(), "view tickets")?;

        let query = TicketQuery {
            category: category.map(|c| c.trim().to_string()),
            status,
            unread_only: false,
        };
        self.db.with_conn(ctx.deadline, |conn| tickets::list_tickets(conn, &query))
    }

    /// Get a ticket. A privileged viewer's first look clears `unread`.
    pub fn get(&self, ctx: &RequestContext, id: i64) -> Result<Ticket, DeskError> {
        ensure(self.policy.can_read(ctx.role(), ResourceKind::Ticket), ctx.role(), "view tickets")?;

        if !self.policy.is_privileged_viewer(ctx.role()) {
            return self
                .db
                .with_conn(ctx.deadline, |conn| tickets::get_ticket(conn, id))?
                .ok_or_else(|| not_found(id));
        }

        let (ticket, cleared) = self.db.with_tx(ctx.deadline, |tx| {
            let mut ticket = tickets::get_ticket(tx, id)?.ok_or_else(|| not_found(id))?;
            let cleared = ticket.unread && tickets::clear_unread(tx, id)?;
            ticket.unread = false;
            Ok((ticket, cleared))
        })?;

        if cleared {
            debug!(ticket_id = id, reader = %ctx.actor_id(), "Ticket marked read");
            self.events.emit(DeskEvent::TicketRead {
                id,
                reader: ctx.actor_id().to_string(),
            });
        }

        Ok(ticket)
    }

    /// Channels with open/resolved/unread counts
    pub fn categories(&self, ctx: &RequestContext) -> Result<Vec<CategorySummary>, DeskError> {
        ensure(self.policy.can_read(ctx.role(), ResourceKind::Ticket), ctx.role(), "view tickets")?;
        self.db.with_conn(ctx.deadline, tickets::category_summaries)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a ticket as Open and unread
    pub fn create(&self, ctx: &RequestContext, input: NewTicket) -> Result<Ticket, DeskError> {
        let category = input.category.trim();
        ensure(
            self.policy.can_write_category(ctx.role(), category),
            ctx.role(),
            &format!("create tickets in {}", category),
        )?;
        input.validate()?;

        let ticket = self.db.with_tx(ctx.deadline, |tx| {
            tickets::insert_ticket(tx, &input, ctx.actor_id(), current_timestamp())
        })?;

        info!(
            ticket_id = ticket.id,
            category = %ticket.category,
            severity = ticket.severity.value(),
            "Created ticket"
        );
        self.events.emit(DeskEvent::TicketCreated {
            id: ticket.id,
            category: ticket.category.clone(),
            severity: ticket.severity.value(),
            created_by: ticket.created_by.clone(),
        });

        Ok(ticket)
    }

    /// Open -> Resolved; a no-op when already resolved
    pub fn resolve(&self, ctx: &RequestContext, id: i64) -> Result<Ticket, DeskError> {
        self.transition(ctx, id, TicketStatus::Resolved)
    }

    /// Resolved -> Open; a no-op when already open
    pub fn reopen(&self, ctx: &RequestContext, id: i64) -> Result<Ticket, DeskError> {
        self.transition(ctx, id, TicketStatus::Open)
    }

    fn transition(&self, ctx: &RequestContext, id: i64, status: TicketStatus) -> Result<Ticket, DeskError> {
        let action = match status {
            TicketStatus::Resolved => "resolve",
            TicketStatus::Open => "reopen",
        };

        // Lookup, policy check and update share one write lock, so a racing
        // transition sees the state this one leaves behind
        let (ticket, changed) = self.db.with_tx(ctx.deadline, |tx| {
            let mut ticket = tickets::get_ticket(tx, id)?.ok_or_else(|| not_found(id))?;
            ensure(
                self.policy.can_resolve_category(ctx.role(), &ticket.category),
                ctx.role(),
                &format!("{} tickets in {}", action, ticket.category),
            )?;

            let changed = tickets::set_status(tx, id, status)? > 0;
            ticket.status = status;
            Ok((ticket, changed))
        })?;

        if !changed {
            debug!(ticket_id = id, status = %status, "Ticket already in requested state");
            return Ok(ticket);
        }

        info!(ticket_id = id, status = %status, by = %ctx.actor_id(), "Ticket status changed");
        let by = ctx.actor_id().to_string();
        self.events.emit(match status {
            TicketStatus::Resolved => DeskEvent::TicketResolved { id, by },
            TicketStatus::Open => DeskEvent::TicketReopened { id, by },
        });

        Ok(ticket)
    }

    /// Delete a ticket and its discussion in one transaction
    pub fn purge(&self, ctx: &RequestContext, id: i64) -> Result<(), DeskError> {
        ensure(self.policy.can_purge(ctx.role()), ctx.role(), "purge tickets")?;

        let messages_removed = self.db.with_tx(ctx.deadline, |tx| {
            let removed = discussion::delete_for_parent(tx, &ParentRef::Ticket(id))?;
            if !tickets::delete_ticket(tx, id)? {
                return Err(not_found(id));
            }
            Ok(removed)
        })?;

        info!(ticket_id = id, messages_removed, by = %ctx.actor_id(), "Purged ticket");
        self.events.emit(DeskEvent::TicketPurged { id, messages_removed });

        Ok(())
    }
}

fn not_found(id: i64) -> DeskError {
    DeskError::NotFound(format!("Ticket {} not found", id))
}
