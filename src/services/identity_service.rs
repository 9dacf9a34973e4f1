//! Identity service - registration, authentication and role management
//!
//! Two bootstrap rules decide who starts out as SuperAdmin:
//! - the configured bootstrap identifier, always, even when it registers
//!   after other accounts exist (and again on every login);
//! - the very first account in an empty store, when enabled.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::{ensure, AccessPolicy, CredentialVerifier, ResourceKind, Role};
use crate::context::RequestContext;
use crate::db::models::{current_timestamp, normalize_identifier, require_text};
use crate::db::{accounts, Account, ApprovalStatus, DeskDb};
use crate::error::DeskError;

use super::events::{DeskEvent, EventBus};

/// Bootstrap settings taken from config
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub bootstrap_identifier: String,
    pub first_account_is_admin: bool,
}

/// Identity service
pub struct IdentityService {
    db: Arc<DeskDb>,
    policy: Arc<AccessPolicy>,
    verifier: Arc<dyn CredentialVerifier>,
    events: Arc<EventBus>,
    bootstrap_id: String,
    first_account_is_admin: bool,
}

impl IdentityService {
    pub fn new(
        db: Arc<DeskDb>,
        policy: Arc<AccessPolicy>,
        verifier: Arc<dyn CredentialVerifier>,
        events: Arc<EventBus>,
        settings: IdentitySettings,
    ) -> Result<Self, DeskError> {
        let bootstrap_id = normalize_identifier(&settings.bootstrap_identifier)
            .map_err(|e| DeskError::Config(format!("bootstrap identifier: {}", e)))?;

        Ok(Self {
            db,
            policy,
            verifier,
            events,
            bootstrap_id,
            first_account_is_admin: settings.first_account_is_admin,
        })
    }

    fn is_bootstrap(&self, id: &str) -> bool {
        id == self.bootstrap_id
    }

    // =========================================================================
    // Unauthenticated operations
    // =========================================================================

    /// Register a new account
    pub fn register(
        &self,
        identifier: &str,
        display_name: &str,
        secret: &str,
    ) -> Result<Account, DeskError> {
        let id = normalize_identifier(identifier)?;
        require_text("display_name", display_name)?;
        require_text("secret", secret)?;

        // Hash outside the write lock
        let credential = self.verifier.seal(secret)?;

        let account = self.db.with_tx(None, |tx| {
            if accounts::get_account(tx, &id)?.is_some() {
                return Err(DeskError::DuplicateIdentifier(id.clone()));
            }

            let first = !accounts::has_accounts(tx)?;
            let (role, approval) = if self.is_bootstrap(&id) || (first && self.first_account_is_admin) {
                (Role::SuperAdmin, ApprovalStatus::Approved)
            } else {
                (Role::Pending, ApprovalStatus::Pending)
            };

            let account = Account {
                id: id.clone(),
                display_name: display_name.trim().to_string(),
                credential,
                role,
                approval,
                created_at: current_timestamp(),
            };
            accounts::insert_account(tx, &account)?;
            Ok(account)
        })?;

        info!(account = %account.id, role = %account.role, "Registered account");
        self.events.emit(DeskEvent::AccountRegistered {
            id: account.id.clone(),
            role: account.role,
            approval: account.approval,
        });

        Ok(account)
    }

    /// Check credentials. Unapproved accounts get `NotApproved` after a
    /// successful credential match.
    pub fn authenticate(&self, identifier: &str, secret: &str) -> Result<Account, DeskError> {
        let account = self.check_credentials(identifier, secret)?;

        let account = if self.is_bootstrap(&account.id) {
            self.enforce_bootstrap(account)?
        } else {
            account
        };

        if !account.is_approved() {
            debug!(account = %account.id, "Authenticated but awaiting approval");
            return Err(DeskError::NotApproved(account.id));
        }

        Ok(account)
    }

    /// The one thing a Pending account may do: ask where it stands
    pub fn approval_status(&self, identifier: &str, secret: &str) -> Result<ApprovalStatus, DeskError> {
        let account = self.check_credentials(identifier, secret)?;
        if self.is_bootstrap(&account.id) {
            return Ok(ApprovalStatus::Approved);
        }
        Ok(account.approval)
    }

    fn check_credentials(&self, identifier: &str, secret: &str) -> Result<Account, DeskError> {
        let id = normalize_identifier(identifier).map_err(|_| DeskError::InvalidCredentials)?;

        let account = self
            .db
            .with_conn(None, |conn| accounts::get_account(conn, &id))?
            .ok_or(DeskError::InvalidCredentials)?;

        if !self.verifier.verify(secret, &account.credential)? {
            warn!(account = %id, "Credential mismatch");
            return Err(DeskError::InvalidCredentials);
        }

        Ok(account)
    }

    /// Force SuperAdmin/Approved onto the bootstrap account and persist it
    fn enforce_bootstrap(&self, mut account: Account) -> Result<Account, DeskError> {
        if account.role == Role::SuperAdmin && account.is_approved() {
            return Ok(account);
        }

        self.db.with_tx(None, |tx| {
            accounts::update_role(tx, &account.id, Role::SuperAdmin)?;
            accounts::update_approval(tx, &account.id, ApprovalStatus::Approved)?;
            Ok(())
        })?;

        info!(account = %account.id, "Restored bootstrap account to super_admin");
        account.role = Role::SuperAdmin;
        account.approval = ApprovalStatus::Approved;
        Ok(account)
    }

    // =========================================================================
    // Role management (SuperAdmin only)
    // =========================================================================

    /// Change an account's role
    pub fn set_role(&self, ctx: &RequestContext, target_id: &str, role: Role) -> Result<Account, DeskError> {
        ensure(self.policy.can_manage_roles(ctx.role()), ctx.role(), "change roles")?;
        let target_id = normalize_identifier(target_id)?;

        if self.is_bootstrap(&target_id) && role != Role::SuperAdmin {
            warn!(by = %ctx.actor_id(), "Refused to demote bootstrap account");
            return Err(DeskError::Forbidden("the bootstrap account cannot be demoted".into()));
        }

        let account = self.db.with_tx(ctx.deadline, |tx| {
            if !accounts::update_role(tx, &target_id, role)? {
                return Err(DeskError::NotFound(format!("Account {} not found", target_id)));
            }
            accounts::get_account(tx, &target_id)?
                .ok_or_else(|| DeskError::Internal("Failed to retrieve updated account".into()))
        })?;

        info!(account = %account.id, role = %role, by = %ctx.actor_id(), "Role updated");
        self.events.emit(DeskEvent::AccountRoleChanged {
            id: account.id.clone(),
            role,
            by: ctx.actor_id().to_string(),
        });

        Ok(account)
    }

    /// Approve or suspend an account. Approving a Pending-role account makes
    /// it a Member.
    pub fn set_approval(
        &self,
        ctx: &RequestContext,
        target_id: &str,
        status: ApprovalStatus,
    ) -> Result<Account, DeskError> {
        ensure(self.policy.can_manage_roles(ctx.role()), ctx.role(), "change approval")?;
        let target_id = normalize_identifier(target_id)?;

        if self.is_bootstrap(&target_id) && status == ApprovalStatus::Pending {
            return Err(DeskError::Forbidden("the bootstrap account cannot be unapproved".into()));
        }

        let account = self.db.with_tx(ctx.deadline, |tx| {
            let current = accounts::get_account(tx, &target_id)?
                .ok_or_else(|| DeskError::NotFound(format!("Account {} not found", target_id)))?;

            accounts::update_approval(tx, &target_id, status)?;
            if status == ApprovalStatus::Approved && current.role == Role::Pending {
                accounts::update_role(tx, &target_id, Role::Member)?;
            }

            accounts::get_account(tx, &target_id)?
                .ok_or_else(|| DeskError::Internal("Failed to retrieve updated account".into()))
        })?;

        info!(account = %account.id, approval = %status, by = %ctx.actor_id(), "Approval updated");
        self.events.emit(DeskEvent::AccountApprovalChanged {
            id: account.id.clone(),
            approval: status,
            by: ctx.actor_id().to_string(),
        });

        Ok(account)
    }

    // =========================================================================
    // Roster views
    // =========================================================================

    pub fn get(&self, ctx: &RequestContext, id: &str) -> Result<Account, DeskError> {
        ensure(self.policy.can_read(ctx.role(), ResourceKind::Account), ctx.role(), "view accounts")?;
        let id = normalize_identifier(id)?;

        self.db
            .with_conn(ctx.deadline, |conn| accounts::get_account(conn, &id))?
            .ok_or_else(|| DeskError::NotFound(format!("Account {} not found", id)))
    }

    pub fn list(
        &self,
        ctx: &RequestContext,
        approval: Option<ApprovalStatus>,
    ) -> Result<Vec<Account>, DeskError> {
        ensure(self.policy.can_read(ctx.role(), ResourceKind::Account), ctx.role(), "view accounts")?;
        self.db.with_conn(ctx.deadline, |conn| accounts::list_accounts(conn, approval))
    }
}
