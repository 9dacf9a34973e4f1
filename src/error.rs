//! Error types for muster

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Identifier already registered: {0}")]
    DuplicateIdentifier(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is awaiting approval: {0}")]
    NotApproved(String),

    #[error("Message body is empty")]
    EmptyMessage,

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Database is locked: {0}")]
    Busy(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for DeskError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            // Raised by the progress handler once a request deadline has passed
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::OperationInterrupted => {
                DeskError::Timeout("statement interrupted at deadline".into())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                DeskError::Busy(e.to_string())
            }
            _ => DeskError::Database(e.to_string()),
        }
    }
}

impl DeskError {
    /// Whether this error is a policy denial rather than a failure
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DeskError::Forbidden(_))
    }
}
