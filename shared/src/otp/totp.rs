//! # TOTP Wrapper
//!
//! Thin wrapper around [`totp_rs`] that fixes the parameters this system
//! uses (SHA-512, 6 digits, 30 second step) and produces the `otpauth://`
//! URI clients scan during enrollment.

use totp_rs::{Algorithm, Secret, TOTP};

use crate::errors::ApiError;

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;

/// A freshly generated TOTP secret, ready to hand to a credential record.
pub struct TotpSecret {
    /// Base32-encoded secret, suitable for manual entry.
    pub secret_base32: String,
    /// `otpauth://totp/...` URI for QR-code enrollment.
    pub uri: String,
}

/// Builds and validates TOTP codes for a fixed (issuer, account) pair.
///
/// Construct one per enrollment/validation call; it is cheap (no I/O) and
/// holds no secret beyond what is passed in.
#[derive(Clone)]
pub struct TotpManager {
    issuer: String,
}

impl TotpManager {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generates a brand-new random secret and its enrollment URI for
    /// `account_name` (the user's username or email).
    pub fn generate_secret(&self, account_name: &str) -> Result<TotpSecret, ApiError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| ApiError::InternalError {
                message: format!("failed to generate OTP secret: {:?}", e),
            })?;

        let totp = TOTP::new(
            Algorithm::SHA512,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| ApiError::InternalError {
            message: format!("failed to build TOTP: {:?}", e),
        })?;

        Ok(TotpSecret {
            secret_base32: secret.to_encoded().to_string(),
            uri: totp.get_url(),
        })
    }

    /// Validates a presented code against a base32-encoded secret.
    pub fn check_code(&self, secret_base32: &str, code: &str, account_name: &str) -> bool {
        let Ok(secret) = Secret::Encoded(secret_base32.to_string()).to_bytes() else {
            return false;
        };
        let Ok(totp) = TOTP::new(
            Algorithm::SHA512,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret,
            Some(self.issuer.clone()),
            account_name.to_string(),
        ) else {
            return false;
        };
        totp.check_current(code).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uri_carries_issuer_and_algorithm() {
        let manager = TotpManager::new("identity-core");
        let secret = manager.generate_secret("alice").unwrap();
        assert!(secret.uri.starts_with("otpauth://totp/"));
        assert!(secret.uri.contains("algorithm=SHA512"));
        assert!(secret.uri.contains("period=30"));
    }

    #[test]
    fn wrong_code_is_rejected() {
        let manager = TotpManager::new("identity-core");
        let secret = manager.generate_secret("alice").unwrap();
        assert!(!manager.check_code(&secret.secret_base32, "000000", "alice"));
    }
}
