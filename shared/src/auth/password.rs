//! # Password Hashing with Argon2id
//!
//! Secure password storage using the Argon2id algorithm, tuned to the
//! identity core's reference profile: 19 MiB memory, 2 passes, 1 lane,
//! 32-byte output, 32-byte salt. This is lighter than a typical
//! single-user desktop profile because the service is expected to
//! verify passwords under concurrent load without a GPU-scale memory
//! budget per request.
//!
//! ## PHC String Format
//!
//! ```text
//! $argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>
//! ```
//!
//! Minimum password length is configurable (`auth.password_min_size`,
//! default 8) rather than a fixed composition-rule checklist; the
//! identity core does not mandate uppercase/digit/symbol mixes.

use crate::errors::ApiError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::RngCore;

const MEMORY_COST_KIB: u32 = 19_456;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;
const OUTPUT_LEN: usize = 32;
const SALT_LEN: usize = 32;

/// Secure password hashing service using Argon2id.
///
/// `Clone`, `Send + Sync`; safe for concurrent use across workers. Each
/// hash operation draws a fresh random salt.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    pub fn new() -> Self {
        let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
            .expect("Argon2 params are statically valid");
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Self { argon2 }
    }

    /// Hashes `password` for storage, returning a PHC-formatted string.
    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| ApiError::internal(format!("salt encoding failed: {e}")))?;

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))
    }

    /// Verifies `password` against a stored PHC hash in constant time.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| ApiError::internal(format!("invalid password hash format: {e}")))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(ApiError::internal(format!("password verification failed: {e}"))),
        }
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

/// Validates password length against the configured minimum.
pub struct PasswordValidator;

impl PasswordValidator {
    pub fn validate(password: &str, min_size: usize) -> Result<(), &'static str> {
        if password.chars().count() < min_size {
            Err("password is too short")
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_correct_password() {
        let hasher = PasswordHasher::new();
        let password = "correct horse battery staple";
        let hash = hasher.hash(password).unwrap();
        assert_ne!(hash, password);
        assert!(hasher.verify(password, &hash).unwrap());
    }

    #[test]
    fn verify_wrong_password_fails() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("rightpassword").unwrap();
        assert!(!hasher.verify("wrongpassword", &hash).unwrap());
    }

    #[test]
    fn different_hashes_for_same_password() {
        let hasher = PasswordHasher::new();
        let password = "samepassword123";
        let hash1 = hasher.hash(password).unwrap();
        let hash2 = hasher.hash(password).unwrap();
        assert_ne!(hash1, hash2);
        assert!(hasher.verify(password, &hash1).unwrap());
        assert!(hasher.verify(password, &hash2).unwrap());
    }

    #[test]
    fn hash_uses_reference_params() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("testpassword").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("m=19456"));
        assert!(hash.contains("t=2"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn validator_enforces_minimum_length() {
        assert!(PasswordValidator::validate("short", 8).is_err());
        assert!(PasswordValidator::validate("longenough", 8).is_ok());
    }
}
