//! # OTP Secret Cipher Ring
//!
//! [`CipherRing`] wraps a set of AES-256-GCM keys parsed from the
//! configuration's `otpkey` bundle (see [`crate::config::OtpConfig`]).
//! Encryption always uses the newest (first) key; decryption tries every
//! key in the ring so an OTP secret encrypted before a rotation still
//! decrypts after one.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum OtpCipherError {
    #[error("malformed otp key bundle entry: {0}")]
    MalformedKey(String),
    #[error("ciphertext too short to contain a nonce")]
    CiphertextTooShort,
    #[error("no otp cipher keys configured")]
    EmptyRing,
    #[error("decryption failed under every configured key")]
    DecryptionFailed,
}

/// A single named AES-256-GCM key, identified by the `key_id` prefix used
/// in the `otpkey` configuration entries (`"<key_id>:<base64 32 bytes>"`).
struct RingKey {
    key_id: String,
    cipher: Aes256Gcm,
}

/// An ordered set of AES-256-GCM keys. The first entry is the signing /
/// encrypting key; all entries are tried on decrypt, newest first, so
/// secrets encrypted under a retired key remain readable until it is
/// dropped from the configured bundle.
pub struct CipherRing {
    keys: Vec<RingKey>,
}

impl CipherRing {
    /// Parses a bundle of `"<key_id>:<base64 32 bytes>"` entries. The first
    /// entry becomes the signing key.
    pub fn from_bundle(entries: &[String]) -> Result<Self, OtpCipherError> {
        if entries.is_empty() {
            return Err(OtpCipherError::EmptyRing);
        }
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let (key_id, key_b64) = entry
                .split_once(':')
                .ok_or_else(|| OtpCipherError::MalformedKey(entry.clone()))?;
            let key_bytes = STANDARD
                .decode(key_b64)
                .map_err(|_| OtpCipherError::MalformedKey(entry.clone()))?;
            if key_bytes.len() != 32 {
                return Err(OtpCipherError::MalformedKey(entry.clone()));
            }
            let cipher = Aes256Gcm::new_from_slice(&key_bytes)
                .map_err(|_| OtpCipherError::MalformedKey(entry.clone()))?;
            keys.push(RingKey {
                key_id: key_id.to_string(),
                cipher,
            });
        }
        Ok(Self { keys })
    }

    /// The identifier of the currently active signing/encrypting key.
    pub fn active_key_id(&self) -> &str {
        &self.keys[0].key_id
    }

    /// Encrypts `plaintext` under the active key. Output is
    /// `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, OtpCipherError> {
        let active = &self.keys[0];
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = active
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| OtpCipherError::DecryptionFailed)?;
        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Decrypts a value produced by [`Self::encrypt`], trying every key in
    /// the ring, newest first.
    pub fn decrypt(&self, encoded: &str) -> Result<String, OtpCipherError> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|_| OtpCipherError::CiphertextTooShort)?;
        if raw.len() < NONCE_LEN {
            return Err(OtpCipherError::CiphertextTooShort);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        for key in &self.keys {
            if let Ok(plain) = key.cipher.decrypt(nonce, ciphertext) {
                return String::from_utf8(plain).map_err(|_| OtpCipherError::DecryptionFailed);
            }
        }
        Err(OtpCipherError::DecryptionFailed)
    }

    /// Generates a fresh random 32-byte key, formatted for inclusion in an
    /// `otpkey` configuration bundle. Useful for bootstrapping local
    /// development environments.
    pub fn generate_bundle_entry(key_id: &str) -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        format!("{}:{}", key_id, STANDARD.encode(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> Vec<String> {
        vec![
            CipherRing::generate_bundle_entry("k2"),
            CipherRing::generate_bundle_entry("k1"),
        ]
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let ring = CipherRing::from_bundle(&sample_bundle()).unwrap();
        let ciphertext = ring.encrypt("otpauth://totp/secret").unwrap();
        assert_eq!(ring.decrypt(&ciphertext).unwrap(), "otpauth://totp/secret");
    }

    #[test]
    fn active_key_is_first_entry() {
        let ring = CipherRing::from_bundle(&sample_bundle()).unwrap();
        assert_eq!(ring.active_key_id(), "k2");
    }

    #[test]
    fn decrypt_under_older_key_still_works_after_rotation() {
        let old_entry = CipherRing::generate_bundle_entry("k1");
        let old_ring = CipherRing::from_bundle(&[old_entry.clone()]).unwrap();
        let ciphertext = old_ring.encrypt("backup-code").unwrap();

        let rotated = CipherRing::from_bundle(&[
            CipherRing::generate_bundle_entry("k2"),
            old_entry,
        ])
        .unwrap();
        assert_eq!(rotated.decrypt(&ciphertext).unwrap(), "backup-code");
    }

    #[test]
    fn empty_bundle_is_rejected() {
        assert!(CipherRing::from_bundle(&[]).is_err());
    }

    #[test]
    fn malformed_entry_is_rejected() {
        assert!(CipherRing::from_bundle(&["not-a-valid-entry".to_string()]).is_err());
    }
}
