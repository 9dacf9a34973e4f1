//! Credential sealing and verification
//!
//! The core never inspects a credential; it hands the presented secret and
//! the stored seal to a [`CredentialVerifier`]. [`Argon2Verifier`] is the
//! default and stores PHC-formatted argon2id hashes.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::DeskError;

/// Injected credential scheme
pub trait CredentialVerifier: Send + Sync {
    /// Produce the opaque value stored for a new account
    fn seal(&self, secret: &str) -> Result<String, DeskError>;

    /// Whether `secret` matches a previously sealed value
    fn verify(&self, secret: &str, sealed: &str) -> Result<bool, DeskError>;
}

/// Argon2id with default parameters
#[derive(Debug, Clone, Default)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn seal(&self, secret: &str) -> Result<String, DeskError> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DeskError::Credential(format!("Failed to hash secret: {e}")))
    }

    fn verify(&self, secret: &str, sealed: &str) -> Result<bool, DeskError> {
        let parsed_hash = PasswordHash::new(sealed)
            .map_err(|e| DeskError::Credential(format!("Invalid credential format: {e}")))?;

        Ok(Argon2::default()
            .verify_password(secret.as_bytes(), &parsed_hash)
            .is_ok())
    }
}
