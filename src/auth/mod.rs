//! Authentication and authorization for muster
//!
//! Provides:
//! - Roles and the access policy table
//! - The injected credential verifier (Argon2 by default)

pub mod password;
pub mod permissions;

pub use password::{Argon2Verifier, CredentialVerifier};
pub use permissions::{ensure, AccessPolicy, ParseEnumError, ResourceKind, Role, WriteTier};
