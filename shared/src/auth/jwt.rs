//! # Token Issuer (C7)
//!
//! Signs and verifies the bearer access/refresh tokens that ride on top of
//! a [`Session`](crate) record. Claims carry `sub` (userid), `id` (the
//! owning session_id), an optional `key` (the plaintext session key, only
//! present on refresh tokens, echoed back so the auth engine can bind a
//! presented refresh token to the session row it claims to belong to), and
//! `scope` (a space-delimited capability set).
//!
//! Signing keys are a rotating keyset, newest first, in the same
//! `"<key_id>:<base64 32 bytes>"` bundle format as the OTP cipher ring
//! ([`crate::otp::cipher::CipherRing`]). Signing always uses the newest
//! key; verification accepts a signature from any key still in the set, so
//! tokens issued just before a rotation remain valid until they expire.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no signing keys configured")]
    EmptyKeyset,
    #[error("malformed signing key entry: {0}")]
    MalformedKey(String),
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("token scope does not satisfy the requested scope")]
    InsufficientScope,
}

/// Claims carried by both access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the owning userid.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// The session_id this token is bound to.
    pub id: String,
    /// Plaintext session key, present only on refresh tokens.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<String>,
    /// Space-delimited capability set.
    pub scope: String,
}

/// Returns true if every token in `required` appears in `granted`.
/// An empty `required` is always satisfied.
pub fn scope_satisfies(granted: &str, required: &str) -> bool {
    let granted: std::collections::HashSet<&str> = granted.split_whitespace().collect();
    required
        .split_whitespace()
        .all(|tok| granted.contains(tok))
}

struct SigningKey {
    key_id: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Token issuer holding the rotating HS256 keyset.
#[derive(Clone)]
pub struct JwtService {
    keys: std::sync::Arc<Vec<SigningKey>>,
    config: JwtConfig,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Result<Self, TokenError> {
        if config.keys.is_empty() {
            return Err(TokenError::EmptyKeyset);
        }
        let mut keys = Vec::with_capacity(config.keys.len());
        for entry in &config.keys {
            let (key_id, key_b64) = entry
                .split_once(':')
                .ok_or_else(|| TokenError::MalformedKey(entry.clone()))?;
            let secret = STANDARD
                .decode(key_b64)
                .map_err(|_| TokenError::MalformedKey(entry.clone()))?;
            keys.push(SigningKey {
                key_id: key_id.to_string(),
                encoding: EncodingKey::from_secret(&secret),
                decoding: DecodingKey::from_secret(&secret),
            });
        }
        Ok(Self {
            keys: std::sync::Arc::new(keys),
            config,
        })
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.config.access_time_seconds
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.config.refresh_time_seconds
    }

    /// Signs a new token for `subject`, bound to `session_id`, good for
    /// `ttl_seconds`. `session_key` is `Some` only for refresh tokens.
    pub fn generate(
        &self,
        subject: &str,
        ttl_seconds: i64,
        scope: &str,
        session_id: &str,
        session_key: Option<&str>,
    ) -> Result<(String, Claims), TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + ttl_seconds,
            id: session_id.to_string(),
            key: session_key.map(|s| s.to_string()),
            scope: scope.to_string(),
        };

        let active = &self.keys[0];
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(active.key_id.clone());

        let token = encode(&header, &claims, &active.encoding).map_err(|_| TokenError::Invalid)?;
        Ok((token, claims))
    }

    /// Verifies `token`, requiring its scope to satisfy `expected_scope`.
    /// Expired tokens are rejected unless `allow_expired` is set (used by
    /// exchange/refresh/logout per §4.7's `ValidateSkipTime`).
    pub fn verify(
        &self,
        token: &str,
        expected_scope: &str,
        allow_expired: bool,
    ) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = !allow_expired;
        validation.leeway = self.config.clock_skew_seconds.max(0) as u64;
        validation.required_spec_claims.clear();

        let mut last_expired = false;
        for key in self.keys.iter() {
            match decode::<Claims>(token, &key.decoding, &validation) {
                Ok(data) => {
                    if !scope_satisfies(&data.claims.scope, expected_scope) {
                        return Err(TokenError::InsufficientScope);
                    }
                    return Ok(data.claims);
                }
                Err(e) => {
                    if matches!(
                        e.kind(),
                        jsonwebtoken::errors::ErrorKind::ExpiredSignature
                    ) {
                        last_expired = true;
                    }
                }
            }
        }

        if last_expired {
            Err(TokenError::Expired)
        } else {
            Err(TokenError::Invalid)
        }
    }

    /// Extracts the bearer token from an `Authorization` header value.
    pub fn extract_from_header(auth_header: &str) -> Option<&str> {
        auth_header.strip_prefix("Bearer ")
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.config.issuer)
            .field("key_count", &self.keys.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    fn bundle_entry(id: &str) -> String {
        format!("{}:{}", id, STANDARD.encode([7u8; 32]))
    }

    fn test_config() -> JwtConfig {
        JwtConfig {
            keys: vec![bundle_entry("k1")],
            issuer: "identity-core".to_string(),
            access_time_seconds: 900,
            refresh_time_seconds: 604_800,
            clock_skew_seconds: 60,
        }
    }

    #[test]
    fn generate_then_verify_roundtrips() {
        let svc = JwtService::new(test_config()).unwrap();
        let (token, _) = svc
            .generate("user1", 900, "all", "user1.abc", None)
            .unwrap();
        let claims = svc.verify(&token, "all", false).unwrap();
        assert_eq!(claims.sub, "user1");
        assert_eq!(claims.id, "user1.abc");
        assert!(claims.key.is_none());
    }

    #[test]
    fn refresh_token_echoes_session_key() {
        let svc = JwtService::new(test_config()).unwrap();
        let (token, _) = svc
            .generate("user1", 604_800, "all", "user1.abc", Some("sesskey"))
            .unwrap();
        let claims = svc.verify(&token, "all", false).unwrap();
        assert_eq!(claims.key.as_deref(), Some("sesskey"));
    }

    #[test]
    fn insufficient_scope_is_rejected() {
        let svc = JwtService::new(test_config()).unwrap();
        let (token, _) = svc
            .generate("user1", 900, "gov.user", "user1.abc", None)
            .unwrap();
        assert!(matches!(
            svc.verify(&token, "gov.user:write", false),
            Err(TokenError::InsufficientScope)
        ));
    }

    #[test]
    fn old_key_still_verifies_after_rotation() {
        let old_entry = bundle_entry("k1");
        let old_cfg = JwtConfig {
            keys: vec![old_entry.clone()],
            ..test_config()
        };
        let old_svc = JwtService::new(old_cfg).unwrap();
        let (token, _) = old_svc
            .generate("user1", 900, "all", "user1.abc", None)
            .unwrap();

        let rotated_cfg = JwtConfig {
            keys: vec![bundle_entry("k2"), old_entry],
            ..test_config()
        };
        let rotated = JwtService::new(rotated_cfg).unwrap();
        assert!(rotated.verify(&token, "all", false).is_ok());
    }

    #[test]
    fn expired_token_rejected_unless_skip_time() {
        let svc = JwtService::new(test_config()).unwrap();
        let (token, _) = svc
            .generate("user1", -10, "all", "user1.abc", None)
            .unwrap();
        assert!(matches!(
            svc.verify(&token, "all", false),
            Err(TokenError::Expired)
        ));
        assert!(svc.verify(&token, "all", true).is_ok());
    }

    #[test]
    fn scope_satisfies_checks_subset() {
        assert!(scope_satisfies("a b c", "a b"));
        assert!(scope_satisfies("a b c", ""));
        assert!(!scope_satisfies("a b", "a c"));
    }
}
