//! Muster - role-gated ticket desk with discussion threads and a mission calendar
//!
//! The core behind a staff portal: accounts that need approval, ticket
//! channels, per-ticket discussion, and a date-indexed calendar with RSVPs.
//! Rendering, sessions and file storage belong to the presentation layer
//! that calls into [`services::Services`].
//!
//! ## Architecture
//!
//! - **auth**: roles, the access policy table, and the injected credential verifier
//! - **db**: SQLite store (`DeskDb`) with per-call deadlines
//! - **services**: identity, tickets, discussion, calendar, unread tracking, event bus
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/muster/
//! ├── muster.db      # SQLite database (WAL)
//! └── config.toml    # Configuration
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use muster::{Actor, Config, DeskDb, RequestContext, Services};
//!
//! # fn main() -> Result<(), muster::DeskError> {
//! let config = Config::default();
//! let db = Arc::new(DeskDb::open(&config.storage_dir)?.with_default_timeout(config.op_timeout()));
//! let services = Services::new(db, &config)?;
//!
//! let account = services.identity.authenticate("root@example.org", "pw1")?;
//! let ctx = RequestContext::new(Actor::from(&account));
//! let open = services.tickets.list(&ctx, Some("ServerAdmin"), None)?;
//! # let _ = open;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod services;

pub use auth::{AccessPolicy, Argon2Verifier, CredentialVerifier, ResourceKind, Role, WriteTier};
pub use config::Config;
pub use context::{Actor, RequestContext};
pub use db::{
    Account, ApprovalStatus, CalendarEntry, CalendarInput, CategorySummary, DeskDb,
    DiscussionEntry, NewTicket, ParentRef, Severity, Ticket, TicketStatus,
};
pub use error::DeskError;
pub use services::{DeskEvent, EventBus, Services};
