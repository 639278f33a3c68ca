//! Password hashing for stored credentials

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier as _};

/// Failure to hash a password
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to hash password: {0}")]
pub struct PasswordError(String);

/// Hashes passwords for storage and checks them at login
pub trait PasswordVerifier: Send + Sync {
    /// Hash `password` into a self-describing string
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError`] if hashing fails.
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// Whether `password` matches `hash`; an unparsable hash never matches
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id with default parameters
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordVerifier;

impl Argon2PasswordVerifier {
    /// Verifier with default parameters
    pub fn new() -> Self {
        Self
    }
}

impl PasswordVerifier for Argon2PasswordVerifier {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(rand::thread_rng());
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }
}
