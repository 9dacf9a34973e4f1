//! Account CRUD operations

use rusqlite::{params, Connection, OptionalExtension};

use super::models::{Account, ApprovalStatus};
use crate::auth::Role;
use crate::error::DeskError;

/// Get account by normalized id
pub fn get_account(conn: &Connection, id: &str) -> Result<Option<Account>, DeskError> {
    conn.query_row(
        "SELECT * FROM accounts WHERE id = ?",
        params![id],
        |row| Account::from_row(row),
    )
    .optional()
    .map_err(DeskError::from)
}

/// Whether any account has been registered yet
pub fn has_accounts(conn: &Connection) -> Result<bool, DeskError> {
    let exists: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM accounts)", [], |row| {
        row.get(0)
    })?;
    Ok(exists)
}

/// List accounts, optionally filtered by approval status, oldest first
pub fn list_accounts(
    conn: &Connection,
    approval: Option<ApprovalStatus>,
) -> Result<Vec<Account>, DeskError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM accounts
         WHERE (?1 IS NULL OR approval = ?1)
         ORDER BY created_at, id",
    )?;

    let rows = stmt.query_map(params![approval], |row| Account::from_row(row))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DeskError::from)
}

/// Insert a new account. The caller checks for duplicates first; a
/// primary-key collision still maps to `DuplicateIdentifier`.
pub fn insert_account(conn: &Connection, account: &Account) -> Result<(), DeskError> {
    conn.execute(
        "INSERT INTO accounts (id, display_name, credential, role, approval, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            account.id,
            account.display_name,
            account.credential,
            account.role,
            account.approval,
            account.created_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DeskError::DuplicateIdentifier(account.id.clone())
        }
        other => DeskError::from(other),
    })?;
    Ok(())
}

/// Set role; returns false when the account does not exist
pub fn update_role(conn: &Connection, id: &str, role: Role) -> Result<bool, DeskError> {
    let changed = conn.execute(
        "UPDATE accounts SET role = ? WHERE id = ?",
        params![role, id],
    )?;
    Ok(changed > 0)
}

/// Set approval status; returns false when the account does not exist
pub fn update_approval(
    conn: &Connection,
    id: &str,
    approval: ApprovalStatus,
) -> Result<bool, DeskError> {
    let changed = conn.execute(
        "UPDATE accounts SET approval = ? WHERE id = ?",
        params![approval, id],
    )?;
    Ok(changed > 0)
}
