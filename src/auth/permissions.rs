//! Roles and the access policy table
//!
//! Every mutating service call re-checks these rules; callers' UI gating is
//! never trusted. The policy is a pure lookup with no I/O.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeskError;

/// Account role
///
/// Privilege ordering is SuperAdmin > Admin/Lead > Member > Pending. Admin
/// and Lead are peers with different write areas (tickets vs. calendar).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Lead,
    Member,
    #[default]
    Pending,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::Lead,
        Role::Member,
        Role::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Lead => "lead",
            Role::Member => "member",
            Role::Pending => "pending",
        }
    }

    /// Privilege tier (Admin and Lead share a tier)
    pub fn tier(&self) -> u8 {
        match self {
            Role::Pending => 0,
            Role::Member => 1,
            Role::Admin | Role::Lead => 2,
            Role::SuperAdmin => 3,
        }
    }

    /// Any role above Pending
    pub fn is_approved_role(&self) -> bool {
        self.tier() > 0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct ParseEnumError(pub String);

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "lead" => Ok(Role::Lead),
            "member" => Ok(Role::Member),
            "pending" => Ok(Role::Pending),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Kinds of resource the policy distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Ticket,
    Calendar,
    Discussion,
    Account,
}

/// Minimum tier allowed to write tickets into a category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteTier {
    /// Admin and SuperAdmin only
    #[default]
    Admin,
    /// Admin, Lead and SuperAdmin
    Lead,
    /// Any approved role
    Member,
}

impl WriteTier {
    pub fn admits(&self, role: Role) -> bool {
        match (self, role) {
            (_, Role::Pending) => false,
            (_, Role::SuperAdmin | Role::Admin) => true,
            (WriteTier::Lead | WriteTier::Member, Role::Lead) => true,
            (WriteTier::Member, Role::Member) => true,
            _ => false,
        }
    }
}

/// Access policy with per-category ticket write tiers
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    category_tiers: HashMap<String, WriteTier>,
}

impl AccessPolicy {
    pub fn new(category_tiers: HashMap<String, WriteTier>) -> Self {
        Self { category_tiers }
    }

    /// Override the write tier of one category
    pub fn with_category(mut self, category: impl Into<String>, tier: WriteTier) -> Self {
        self.category_tiers.insert(category.into(), tier);
        self
    }

    pub fn category_tier(&self, category: &str) -> WriteTier {
        self.category_tiers.get(category).copied().unwrap_or_default()
    }

    pub fn can_read(&self, role: Role, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Account => matches!(role, Role::SuperAdmin | Role::Admin),
            _ => role.is_approved_role(),
        }
    }

    pub fn can_write(&self, role: Role, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Ticket => matches!(role, Role::SuperAdmin | Role::Admin),
            ResourceKind::Calendar => matches!(role, Role::SuperAdmin | Role::Lead),
            ResourceKind::Discussion => role.is_approved_role(),
            ResourceKind::Account => self.can_manage_roles(role),
        }
    }

    pub fn can_resolve(&self, role: Role, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Ticket => matches!(role, Role::SuperAdmin | Role::Admin),
            _ => false,
        }
    }

    pub fn can_manage_roles(&self, role: Role) -> bool {
        role == Role::SuperAdmin
    }

    /// Ticket creation in a specific category
    pub fn can_write_category(&self, role: Role, category: &str) -> bool {
        self.category_tier(category).admits(role)
    }

    /// Resolve/reopen in a specific category. Leads may close out tickets in
    /// categories they are allowed to write; Members never resolve.
    pub fn can_resolve_category(&self, role: Role, category: &str) -> bool {
        self.can_resolve(role, ResourceKind::Ticket)
            || (role == Role::Lead && self.category_tier(category).admits(Role::Lead))
    }

    /// Physical ticket deletion
    pub fn can_purge(&self, role: Role) -> bool {
        role == Role::SuperAdmin
    }

    /// Admin-tier viewers whose first look at a ticket marks it read
    pub fn is_privileged_viewer(&self, role: Role) -> bool {
        matches!(role, Role::SuperAdmin | Role::Admin)
    }
}

/// Turn a policy decision into a `Forbidden` error
pub fn ensure(allowed: bool, role: Role, action: &str) -> Result<(), DeskError> {
    if allowed {
        Ok(())
    } else {
        Err(DeskError::Forbidden(format!("{} may not {}", role, action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_least_privilege() {
        assert_eq!(Role::default(), Role::Pending);
        assert_eq!(WriteTier::default(), WriteTier::Admin);
    }

    #[test]
    fn test_pending_can_do_nothing() {
        let policy = AccessPolicy::default();
        for kind in [
            ResourceKind::Ticket,
            ResourceKind::Calendar,
            ResourceKind::Discussion,
            ResourceKind::Account,
        ] {
            assert!(!policy.can_read(Role::Pending, kind));
            assert!(!policy.can_write(Role::Pending, kind));
            assert!(!policy.can_resolve(Role::Pending, kind));
        }
        assert!(!policy.can_write_category(Role::Pending, "anything"));
        assert!(!AccessPolicy::default()
            .with_category("open", WriteTier::Member)
            .can_write_category(Role::Pending, "open"));
    }

    #[test]
    fn test_write_splits() {
        let policy = AccessPolicy::default();

        assert!(policy.can_write(Role::Admin, ResourceKind::Ticket));
        assert!(!policy.can_write(Role::Admin, ResourceKind::Calendar));

        assert!(policy.can_write(Role::Lead, ResourceKind::Calendar));
        assert!(!policy.can_write(Role::Lead, ResourceKind::Ticket));

        assert!(!policy.can_write(Role::Member, ResourceKind::Calendar));
        assert!(policy.can_write(Role::Member, ResourceKind::Discussion));

        for kind in [ResourceKind::Ticket, ResourceKind::Calendar, ResourceKind::Account] {
            assert!(policy.can_write(Role::SuperAdmin, kind));
        }
    }

    #[test]
    fn test_only_super_admin_manages_roles() {
        let policy = AccessPolicy::default();
        for role in Role::ALL {
            assert_eq!(policy.can_manage_roles(role), role == Role::SuperAdmin);
        }
    }

    #[test]
    fn test_category_tiers() {
        let policy = AccessPolicy::default()
            .with_category("Events", WriteTier::Lead)
            .with_category("Suggestions", WriteTier::Member);

        assert!(!policy.can_write_category(Role::Lead, "ServerAdmin"));
        assert!(policy.can_write_category(Role::Admin, "ServerAdmin"));

        assert!(policy.can_write_category(Role::Lead, "Events"));
        assert!(!policy.can_write_category(Role::Member, "Events"));
        assert!(policy.can_resolve_category(Role::Lead, "Events"));
        assert!(!policy.can_resolve_category(Role::Lead, "ServerAdmin"));

        assert!(policy.can_write_category(Role::Member, "Suggestions"));
        assert!(!policy.can_resolve_category(Role::Member, "Suggestions"));
    }

    #[test]
    fn test_privilege_ordering_is_monotone() {
        // Anything a lower tier may do, SuperAdmin may do too
        let policy = AccessPolicy::default().with_category("Events", WriteTier::Lead);
        for role in Role::ALL {
            for kind in [
                ResourceKind::Ticket,
                ResourceKind::Calendar,
                ResourceKind::Discussion,
                ResourceKind::Account,
            ] {
                if policy.can_read(role, kind) {
                    assert!(policy.can_read(Role::SuperAdmin, kind));
                }
                if policy.can_write(role, kind) {
                    assert!(policy.can_write(Role::SuperAdmin, kind));
                }
            }
            if policy.can_write_category(role, "Events") {
                assert!(policy.can_write_category(Role::SuperAdmin, "Events"));
            }
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("super_admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!("Super-Admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!("LEAD".parse::<Role>().unwrap(), Role::Lead);
        assert!("staff".parse::<Role>().is_err());
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(true, Role::Member, "post").is_ok());
        let err = ensure(false, Role::Member, "edit the calendar").unwrap_err();
        assert!(err.is_forbidden());
        assert!(err.to_string().contains("member may not edit the calendar"));
    }
}
