//! SQLite backing store
//!
//! One `DeskDb` handle owns the connection; repositories in the submodules
//! are free functions over `&Connection` so they run the same inside or
//! outside a transaction.
//!
//! ## Tables
//!
//! - `accounts` - identities, sealed credentials, role and approval
//! - `tickets` - issue records grouped by category
//! - `discussion_entries` - append-only messages on tickets and calendar days
//! - `calendar_entries` / `calendar_attendance` - one entry per date plus RSVPs
//!
//! ## Deadlines
//!
//! Every call takes an optional deadline. Work never starts past it, and a
//! progress handler interrupts a running statement once it passes; the
//! interrupt surfaces as `DeskError::Timeout` and the open transaction rolls
//! back.

pub mod accounts;
pub mod calendar;
pub mod discussion;
pub mod models;
pub mod schema;
pub mod tickets;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::error::DeskError;

/// Statements between deadline checks
const PROGRESS_INTERVAL_OPS: i32 = 1_000;

/// Lock wait for calls without a deadline
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database for the desk
pub struct DeskDb {
    conn: Mutex<Connection>,
    default_timeout: Option<Duration>,
}

impl DeskDb {
    /// Open or create the desk database
    pub fn open(storage_dir: &Path) -> Result<Self, DeskError> {
        let db_path = storage_dir.join("muster.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)?;

        // WAL for concurrent readers; writers from other processes queue
        // on the busy handler instead of failing immediately
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, DeskError> {
        debug!("Opening in-memory SQLite database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DeskError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            default_timeout: None,
        })
    }

    /// Deadline applied when the caller supplies none
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DeskError> {
        self.conn
            .lock()
            .map_err(|e| DeskError::Internal(format!("Lock poisoned: {}", e)))
    }

    fn effective_deadline(&self, deadline: Option<Instant>) -> Option<Instant> {
        deadline.or_else(|| self.default_timeout.map(|t| Instant::now() + t))
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, deadline: Option<Instant>, f: F) -> Result<T, DeskError>
    where
        F: FnOnce(&Connection) -> Result<T, DeskError>,
    {
        let deadline = self.effective_deadline(deadline);
        let conn = self.lock()?;
        arm_deadline(&conn, deadline)?;
        let result = f(&conn).map_err(|e| lock_wait_expired(e, deadline));
        disarm_deadline(&conn)?;
        result
    }

    /// Run a write inside an immediate transaction
    ///
    /// The write lock is taken up front so concurrent writers to the same
    /// database file serialise. Commits on `Ok`, rolls back on `Err`.
    pub fn with_tx<F, T>(&self, deadline: Option<Instant>, f: F) -> Result<T, DeskError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DeskError>,
    {
        let deadline = self.effective_deadline(deadline);
        let mut conn = self.lock()?;
        arm_deadline(&conn, deadline)?;
        let result = run_tx(&mut conn, f).map_err(|e| lock_wait_expired(e, deadline));
        disarm_deadline(&conn)?;
        result
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, DeskError> {
        self.with_conn(None, |conn| {
            let count = |sql: &str| -> Result<u64, DeskError> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                account_count: count("SELECT COUNT(*) FROM accounts")?,
                pending_accounts: count("SELECT COUNT(*) FROM accounts WHERE approval = 'pending'")?,
                ticket_count: count("SELECT COUNT(*) FROM tickets")?,
                open_tickets: count("SELECT COUNT(*) FROM tickets WHERE status = 'open'")?,
                unread_tickets: count("SELECT COUNT(*) FROM tickets WHERE unread = 1")?,
                discussion_count: count("SELECT COUNT(*) FROM discussion_entries")?,
                calendar_count: count("SELECT COUNT(*) FROM calendar_entries")?,
            })
        })
    }
}

fn run_tx<F, T>(conn: &mut Connection, f: F) -> Result<T, DeskError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, DeskError>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Bound both statement execution and lock waits by `deadline`
///
/// The progress handler never runs while SQLite sleeps on another
/// process's lock, so the busy timeout is shortened to the time remaining.
fn arm_deadline(conn: &Connection, deadline: Option<Instant>) -> Result<(), DeskError> {
    if let Some(deadline) = deadline {
        let now = Instant::now();
        if now >= deadline {
            return Err(DeskError::Timeout("deadline passed before the call started".into()));
        }
        conn.busy_timeout(deadline - now)?;
        conn.progress_handler(
            PROGRESS_INTERVAL_OPS,
            Some(move || Instant::now() >= deadline),
        );
    }
    Ok(())
}

fn disarm_deadline(conn: &Connection) -> Result<(), DeskError> {
    conn.progress_handler(0, None::<fn() -> bool>);
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// A lock wait that ran out under a deadline is that deadline expiring
fn lock_wait_expired(e: DeskError, deadline: Option<Instant>) -> DeskError {
    match e {
        DeskError::Busy(msg) if deadline.is_some() => {
            DeskError::Timeout(format!("lock wait ran past deadline: {}", msg))
        }
        other => other,
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub account_count: u64,
    pub pending_accounts: u64,
    pub ticket_count: u64,
    pub open_tickets: u64,
    pub unread_tickets: u64,
    pub discussion_count: u64,
    pub calendar_count: u64,
}

// Re-exports
pub use models::{
    Account, ApprovalStatus, CalendarEntry, CalendarInput, CategorySummary, DiscussionEntry,
    NewTicket, ParentRef, Severity, Ticket, TicketStatus,
};
