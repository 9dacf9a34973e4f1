//! Event system for desk operations
//!
//! Services emit an event after each committed state change. Useful for:
//! - Audit logging
//! - Live notification badges in the UI layer

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::auth::Role;
use crate::db::models::{ApprovalStatus, ParentRef};

/// Desk events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum DeskEvent {
    // Account events
    AccountRegistered {
        id: String,
        role: Role,
        approval: ApprovalStatus,
    },
    AccountRoleChanged {
        id: String,
        role: Role,
        by: String,
    },
    AccountApprovalChanged {
        id: String,
        approval: ApprovalStatus,
        by: String,
    },

    // Ticket events
    TicketCreated {
        id: i64,
        category: String,
        severity: u8,
        created_by: String,
    },
    TicketResolved {
        id: i64,
        by: String,
    },
    TicketReopened {
        id: i64,
        by: String,
    },
    TicketRead {
        id: i64,
        reader: String,
    },
    TicketPurged {
        id: i64,
        messages_removed: usize,
    },

    // Discussion events
    MessagePosted {
        parent: ParentRef,
        entry_id: i64,
        author: String,
    },

    // Calendar events
    CalendarUpdated {
        date: NaiveDate,
        by: String,
    },
    CalendarRemoved {
        date: NaiveDate,
        messages_removed: usize,
    },
    AttendanceChanged {
        date: NaiveDate,
        account_id: String,
        attending: bool,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &DeskEvent);
}

/// Event bus for broadcasting desk events
pub struct EventBus {
    sender: broadcast::Sender<DeskEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: DeskEvent) {
        trace!(event = ?event, "Emitting desk event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &DeskEvent) {
        match event {
            DeskEvent::AccountRegistered { id, role, approval } => {
                info!(account = %id, role = %role, approval = %approval, "Account registered");
            }
            DeskEvent::AccountRoleChanged { id, role, by } => {
                info!(account = %id, role = %role, by = %by, "Role changed");
            }
            DeskEvent::AccountApprovalChanged { id, approval, by } => {
                info!(account = %id, approval = %approval, by = %by, "Approval changed");
            }
            DeskEvent::TicketCreated {
                id,
                category,
                severity,
                created_by,
            } => {
                info!(
                    ticket_id = id,
                    category = %category,
                    severity = severity,
                    by = %created_by,
                    "Ticket created"
                );
            }
            DeskEvent::TicketPurged {
                id,
                messages_removed,
            } => {
                info!(ticket_id = id, messages_removed = messages_removed, "Ticket purged");
            }
            DeskEvent::MessagePosted {
                parent,
                entry_id,
                author,
            } => {
                debug!(parent = %parent, entry_id = entry_id, author = %author, "Message posted");
            }
            _ => {
                debug!(event = ?event, "Desk event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
