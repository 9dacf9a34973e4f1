//! Request context passed to every service operation
//!
//! Carries the acting account (as resolved by the presentation layer) and an
//! optional deadline for the backing-store call.

use std::time::{Duration, Instant};

use crate::auth::Role;
use crate::db::models::Account;

/// The account performing an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

impl From<&Account> for Actor {
    /// Unapproved accounts act as Pending regardless of their stored role
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            role: account.effective_role(),
        }
    }
}

/// Per-request context
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: Actor,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            deadline: None,
        }
    }

    /// Abort the backing-store call once `deadline` passes
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn role(&self) -> Role {
        self.actor.role
    }

    pub fn actor_id(&self) -> &str {
        &self.actor.id
    }
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestContext({} as {})", self.actor.id, self.actor.role)
    }
}
