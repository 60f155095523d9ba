//! # Crypto Primitives
//!
//! Small, framework-agnostic helpers used throughout the identity core for
//! anything that needs a fast keyed hash or a random opaque identifier.
//!
//! ## Overview
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`keyed_hash`] | Blake2b hash of a secret, for session keys / reset codes / API-key secrets |
//! | [`verify_keyed_hash`] | Constant-time-ish comparison via re-hash |
//! | [`random_opaque_id`] | Random URL-safe base64 identifier of a given byte length |
//! | [`random_token`] | Random URL-safe base64 secret (session key, reset code, API-key secret) |
//!
//! Unlike password hashing (see [`crate::auth::password`]), none of these
//! values are memory-hard: they protect bearer secrets that are themselves
//! high-entropy random strings, not user-chosen passwords, so a fast keyed
//! hash is the right tool and a slow one would only cost CPU on every
//! session refresh.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use blake2::{Blake2b512, Digest};
use rand::RngCore;

/// Hashes a plaintext secret with Blake2b-512.
///
/// Returns the digest hex-encoded so it can be stored in a `text` column
/// and compared with a simple equality check.
pub fn keyed_hash(plaintext: &str) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(plaintext.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Verifies a plaintext secret against a stored Blake2b-512 hash.
pub fn verify_keyed_hash(plaintext: &str, stored_hash: &str) -> bool {
    keyed_hash(plaintext) == stored_hash
}

/// Generates a random URL-safe base64 identifier built from `bytes` random
/// bytes (so 23 bytes yields a 31-character userid).
pub fn random_opaque_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Generates a random URL-safe base64 secret suitable for a session key,
/// reset code, or API-key secret. Callers choose the entropy size; the
/// session key uses 32 bytes, reset codes use 16.
pub fn random_token(bytes: usize) -> String {
    random_opaque_id(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_hash_is_deterministic() {
        let h1 = keyed_hash("super-secret-key");
        let h2 = keyed_hash("super-secret-key");
        assert_eq!(h1, h2);
    }

    #[test]
    fn keyed_hash_distinguishes_inputs() {
        assert_ne!(keyed_hash("a"), keyed_hash("b"));
    }

    #[test]
    fn verify_keyed_hash_roundtrip() {
        let secret = "session-key-abc";
        let hash = keyed_hash(secret);
        assert!(verify_keyed_hash(secret, &hash));
        assert!(!verify_keyed_hash("wrong", &hash));
    }

    #[test]
    fn random_opaque_id_has_expected_length() {
        // 23 random bytes base64url-encoded without padding -> 31 chars
        let id = random_opaque_id(23);
        assert_eq!(id.len(), 31);
    }

    #[test]
    fn random_token_is_unique() {
        let a = random_token(32);
        let b = random_token(32);
        assert_ne!(a, b);
    }
}
