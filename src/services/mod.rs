//! Service layer for muster
//!
//! Services encapsulate business logic between the presentation layer and
//! repositories. Each service wraps database operations with:
//! - Access policy checks against the request's actor
//! - Input validation
//! - Transaction boundaries
//! - Event emission for audit/notifications
//!
//! ## Architecture
//!
//! ```text
//! UI / CLI (thin)
//!     ↓
//! Service Layer (policy + business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod calendar_service;
pub mod discussion_service;
pub mod events;
pub mod identity_service;
pub mod notification_service;
pub mod ticket_service;

// Re-exports
pub use calendar_service::CalendarService;
pub use discussion_service::DiscussionService;
pub use events::{spawn_logging_listener, DeskEvent, EventBus, EventListener, LoggingEventListener};
pub use identity_service::{IdentityService, IdentitySettings};
pub use notification_service::NotificationService;
pub use ticket_service::TicketService;

use std::sync::Arc;

use crate::auth::{AccessPolicy, Argon2Verifier, CredentialVerifier};
use crate::config::Config;
use crate::db::DeskDb;
use crate::error::DeskError;

/// Service container for dependency injection
///
/// Holds all services over one shared database handle and event bus.
pub struct Services {
    pub identity: Arc<IdentityService>,
    pub tickets: Arc<TicketService>,
    pub discussion: Arc<DiscussionService>,
    pub calendar: Arc<CalendarService>,
    pub notifications: Arc<NotificationService>,
    pub policy: Arc<AccessPolicy>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with the default Argon2 verifier
    pub fn new(db: Arc<DeskDb>, config: &Config) -> Result<Self, DeskError> {
        Self::with_verifier(db, config, Arc::new(Argon2Verifier::default()))
    }

    /// Create all services with an injected credential verifier
    pub fn with_verifier(
        db: Arc<DeskDb>,
        config: &Config,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Result<Self, DeskError> {
        let events = Arc::new(EventBus::new());
        let policy = Arc::new(config.access_policy());

        let identity = IdentityService::new(
            db.clone(),
            policy.clone(),
            verifier,
            events.clone(),
            IdentitySettings {
                bootstrap_identifier: config.bootstrap_identifier.clone(),
                first_account_is_admin: config.first_account_is_admin,
            },
        )?;

        Ok(Self {
            identity: Arc::new(identity),
            tickets: Arc::new(TicketService::new(db.clone(), policy.clone(), events.clone())),
            discussion: Arc::new(DiscussionService::new(db.clone(), policy.clone(), events.clone())),
            calendar: Arc::new(CalendarService::new(
                db.clone(),
                policy.clone(),
                events.clone(),
                config.calendar_window_days,
            )),
            notifications: Arc::new(NotificationService::new(db, policy.clone())),
            policy,
            events,
        })
    }
}
