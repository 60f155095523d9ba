//! # Auth Engine (C9)
//!
//! The login state machine: Lookup → RatelimitCheck → PasswordCheck →
//! OTPGate → SessionBind → TokenIssue → Publish → ResetFailure. Also
//! owns the refresh-token lifecycle: `exchange` (no rotation), `refresh`
//! (rotates the session key), and `logout`.
//!
//! ## Failure accounting
//!
//! A wrong password or a wrong OTP code/backup code both bump
//! `failed_login_count` and stamp `failed_login_time`, which feeds the
//! ratelimit cliff on the next attempt (`f(n) = min(n²·1s, 24h)`). A
//! missing OTP code (`otp_required`) or a replayed OTP code
//! ("already used") are not guesses, so neither increments the counter.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared::{
    auth::{jwt::JwtService, password::PasswordHasher},
    config::AuthConfig,
    crypto,
    errors::ApiError,
    mail::{send_best_effort, MailMessage, Mailer},
    otp::{SecretRefresherHandle, TotpManager},
    redis_client::RedisClient,
};

use crate::domain::{SelfUserProfile, Session, User};
use crate::repository::{SessionRepository, UserRepository};

const SECONDS_PER_DAY: i64 = 86_400;
/// Above this failure count, n² would only ever clamp to the same
/// 24h cliff anyway, so short-circuit before squaring a large counter.
const RATELIMIT_SENTINEL_COUNT: i32 = 293;

/// The signed access/refresh pair handed back by every flow that mints
/// tokens (login, exchange, refresh).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: i64,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthResponse {
    pub tokens: TokenPair,
    pub user: SelfUserProfile,
}

/// Everything a login attempt presents at `Start`.
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
    pub otp_code: Option<String>,
    pub otp_backup: Option<String>,
    /// A refresh token from a still-live session, presented so a second
    /// login from the same device binds to the existing session instead
    /// of minting a new one.
    pub existing_refresh_token: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Returns the ratelimit cliff, in seconds, for a user with
/// `failed_login_count` prior failures: `min(n², 86400)`.
fn ratelimit_delay_seconds(failed_login_count: i32) -> i64 {
    if failed_login_count > RATELIMIT_SENTINEL_COUNT {
        return SECONDS_PER_DAY;
    }
    let n = failed_login_count as i64;
    (n * n).min(SECONDS_PER_DAY)
}

/// A deliberately loose email heuristic, good enough to route `Lookup`
/// between `GetByEmail`/`GetByUsername`, not a validator.
fn looks_like_email(identifier: &str) -> bool {
    match identifier.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    session_repo: SessionRepository,
    jwt_service: Arc<JwtService>,
    password_hasher: Arc<PasswordHasher>,
    totp_manager: TotpManager,
    secret_refresher: SecretRefresherHandle,
    redis_client: RedisClient,
    mailer: Arc<dyn Mailer>,
    auth_config: AuthConfig,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_repo: UserRepository,
        session_repo: SessionRepository,
        jwt_service: Arc<JwtService>,
        password_hasher: Arc<PasswordHasher>,
        totp_manager: TotpManager,
        secret_refresher: SecretRefresherHandle,
        redis_client: RedisClient,
        mailer: Arc<dyn Mailer>,
        auth_config: AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            jwt_service,
            password_hasher,
            totp_manager,
            secret_refresher,
            redis_client,
            mailer,
            auth_config,
        }
    }

    async fn increment_failure(&self, user: &User, now: i64) -> Result<(), ApiError> {
        let count = user.failed_login_count.saturating_add(1);
        self.user_repo.update_failed_login(&user.userid, now, count).await
    }

    async fn decrypt_otp_field(&self, ciphertext: &str) -> Result<String, ApiError> {
        let ring = self
            .secret_refresher
            .current()
            .await
            .map_err(|_| ApiError::internal("otp cipher unavailable"))?;
        ring.decrypt(ciphertext)
            .map_err(|_| ApiError::internal("otp field decryption failed"))
    }

    async fn validate_otp_code(&self, user: &User, code: &str) -> Result<bool, ApiError> {
        let secret_cipher = user
            .otp_secret
            .as_deref()
            .ok_or_else(|| ApiError::internal("otp enabled without a secret"))?;
        let secret_base32 = self.decrypt_otp_field(secret_cipher).await?;
        Ok(self.totp_manager.check_code(&secret_base32, code, &user.username))
    }

    async fn validate_otp_backup(&self, user: &User, backup: &str) -> Result<bool, ApiError> {
        let backup_cipher = user
            .otp_backup
            .as_deref()
            .ok_or_else(|| ApiError::internal("otp enabled without a backup code"))?;
        let stored = self.decrypt_otp_field(backup_cipher).await?;
        Ok(stored == backup)
    }

    /// Builds a brand-new session for `user`, per `Login`'s `SessionBind`
    /// fallback.
    fn new_session(user: &User, req: &LoginRequest, now: i64) -> (Session, String) {
        Session::new(&user.userid, req.ip_address.clone(), req.user_agent.clone(), now)
    }

    /// `SessionBind`: reuses a live session presented via
    /// `existing_refresh_token` if its claims resolve to this user and
    /// the session still exists; otherwise mints a new one. Returns the
    /// bound session, its plaintext key, and whether it is newly created.
    async fn bind_session(&self, user: &User, req: &LoginRequest, now: i64) -> (Session, String, bool) {
        if let Some(token) = req.existing_refresh_token.as_deref() {
            if let Ok(claims) = self.jwt_service.verify(token, "all", true) {
                if claims.sub == user.userid {
                    if let Ok(Some(mut existing)) = self.session_repo.get_by_id(&claims.id).await {
                        let new_key = existing.rehash_key(now);
                        existing.auth_time = now;
                        return (existing, new_key, false);
                    }
                }
            }
        }
        let (session, key) = Self::new_session(user, req, now);
        (session, key, true)
    }

    /// Runs the full `Login` state machine.
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, ApiError> {
        let now = Utc::now().timestamp();

        // Lookup
        let user = if looks_like_email(&req.identifier) {
            self.user_repo.get_by_email(&req.identifier).await?
        } else {
            self.user_repo.get_by_username(&req.identifier).await?
        }
        .ok_or_else(|| ApiError::unauthenticated("invalid username or password"))?;

        // RatelimitCheck
        let delay = ratelimit_delay_seconds(user.failed_login_count);
        let unlocks_at = user.failed_login_time + delay;
        if now < unlocks_at {
            return Err(ApiError::TooManyRequests {
                retry_after_seconds: (unlocks_at - now).max(1),
            });
        }

        // PasswordCheck
        if !self.password_hasher.verify(&req.password, &user.pass_hash)? {
            self.increment_failure(&user, now).await?;
            return Err(ApiError::unauthenticated("invalid username or password"));
        }

        // OTPGate
        if user.otp_enabled {
            let code = req.otp_code.as_deref().filter(|s| !s.is_empty());
            let backup = req.otp_backup.as_deref().filter(|s| !s.is_empty());

            match (code, backup) {
                (None, None) => {
                    return Err(ApiError::bad_request_coded(
                        "otp code required",
                        "otp_required",
                    ));
                }
                (_, Some(backup_code)) => {
                    if !self.validate_otp_backup(&user, backup_code).await? {
                        self.increment_failure(&user, now).await?;
                        return Err(ApiError::unauthenticated("invalid otp backup code"));
                    }
                    send_best_effort(
                        self.mailer.as_ref(),
                        MailMessage {
                            to: user.email.clone(),
                            action: "otp_backup_used",
                            subject: "Backup code used to sign in".to_string(),
                            body: format!(
                                "Your account {} just used a one-time backup code to sign in.",
                                user.username
                            ),
                        },
                    )
                    .await;
                }
                (Some(code), None) => {
                    if self.redis_client.is_otp_code_used(&user.userid, code).await? {
                        return Err(ApiError::bad_request("OTP code already used"));
                    }
                    if !self.validate_otp_code(&user, code).await? {
                        self.increment_failure(&user, now).await?;
                        return Err(ApiError::unauthenticated("invalid otp code"));
                    }
                    self.redis_client.mark_otp_code_used(&user.userid, code).await?;
                }
            }
        }

        // SessionBind
        let (session, plaintext_key, is_new) = self.bind_session(&user, &req, now).await;

        // TokenIssue
        let (access_token, access_claims) = self
            .jwt_service
            .generate(
                &user.userid,
                self.jwt_service.access_ttl_seconds(),
                "all",
                &session.session_id,
                None,
            )
            .map_err(|_| ApiError::internal("token generation failed"))?;
        let (refresh_token, refresh_claims) = self
            .jwt_service
            .generate(
                &user.userid,
                self.jwt_service.refresh_ttl_seconds(),
                "all",
                &session.session_id,
                Some(&plaintext_key),
            )
            .map_err(|_| ApiError::internal("token generation failed"))?;

        // Publish
        if is_new {
            self.session_repo.insert(&session).await?;
            if self.auth_config.new_login_email {
                send_best_effort(
                    self.mailer.as_ref(),
                    MailMessage {
                        to: user.email.clone(),
                        action: "newlogin",
                        subject: "New sign-in to your account".to_string(),
                        body: format!("A new sign-in to {} was just recorded.", user.username),
                    },
                )
                .await;
            }
        } else {
            self.session_repo
                .rehash_key(&session.session_id, &session.key_hash, session.time)
                .await?;
        }
        self.redis_client
            .cache_session_key(
                &session.session_id,
                &session.key_hash,
                Duration::from_secs(self.auth_config.refresh_cache_seconds.max(0) as u64),
            )
            .await
            .ok();

        // ResetFailure
        if user.failed_login_count != 0 {
            self.user_repo.update_failed_login(&user.userid, 0, 0).await?;
        }

        Ok(AuthResponse {
            tokens: TokenPair {
                access_token,
                access_expires_at: access_claims.exp,
                refresh_token,
                refresh_expires_at: refresh_claims.exp,
            },
            user: SelfUserProfile::from(&user),
        })
    }

    /// Validates a refresh token's signature, binds it to its session,
    /// and confirms the presented key still matches. Shared by
    /// `exchange` and `refresh`.
    async fn validate_refresh(&self, refresh_token: &str) -> Result<(String, Session), ApiError> {
        let claims = self
            .jwt_service
            .verify(refresh_token, "all", false)
            .map_err(|_| ApiError::unauthenticated("invalid or expired refresh token"))?;
        let presented_key = claims
            .key
            .ok_or_else(|| ApiError::unauthenticated("malformed refresh token"))?;

        let session = self
            .session_repo
            .get_by_id(&claims.id)
            .await?
            .ok_or_else(|| ApiError::unauthenticated("session not found"))?;
        if session.userid != claims.sub {
            return Err(ApiError::unauthenticated("session owner mismatch"));
        }

        let key_hash = match self.redis_client.get_cached_session_key(&session.session_id).await {
            Ok(Some(cached)) => cached,
            _ => session.key_hash.clone(),
        };
        if !crypto::verify_keyed_hash(&presented_key, &key_hash) {
            return Err(ApiError::unauthenticated("stale refresh token"));
        }

        Ok((claims.sub, session))
    }

    /// `exchange`: mints a fresh access token without rotating the
    /// session key or refresh token.
    pub async fn exchange(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let (userid, session) = self.validate_refresh(refresh_token).await?;

        let (access_token, access_claims) = self
            .jwt_service
            .generate(
                &userid,
                self.jwt_service.access_ttl_seconds(),
                "all",
                &session.session_id,
                None,
            )
            .map_err(|_| ApiError::internal("token generation failed"))?;

        Ok(TokenPair {
            access_token,
            access_expires_at: access_claims.exp,
            refresh_token: refresh_token.to_string(),
            refresh_expires_at: Utc::now().timestamp() + self.jwt_service.refresh_ttl_seconds(),
        })
    }

    /// `refresh`: rotates the session key and issues a new access +
    /// refresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let (userid, mut session) = self.validate_refresh(refresh_token).await?;
        let now = Utc::now().timestamp();

        let new_key = session.rehash_key(now);
        self.session_repo
            .rehash_key(&session.session_id, &session.key_hash, now)
            .await?;
        self.redis_client
            .cache_session_key(
                &session.session_id,
                &session.key_hash,
                Duration::from_secs(self.auth_config.refresh_cache_seconds.max(0) as u64),
            )
            .await
            .ok();

        let (access_token, access_claims) = self
            .jwt_service
            .generate(
                &userid,
                self.jwt_service.access_ttl_seconds(),
                "all",
                &session.session_id,
                None,
            )
            .map_err(|_| ApiError::internal("token generation failed"))?;
        let (new_refresh_token, refresh_claims) = self
            .jwt_service
            .generate(
                &userid,
                self.jwt_service.refresh_ttl_seconds(),
                "all",
                &session.session_id,
                Some(&new_key),
            )
            .map_err(|_| ApiError::internal("token generation failed"))?;

        Ok(TokenPair {
            access_token,
            access_expires_at: access_claims.exp,
            refresh_token: new_refresh_token,
            refresh_expires_at: refresh_claims.exp,
        })
    }

    /// `logout`: idempotent. Accepts an expired refresh token (time-skip
    /// allowed) and always reports success, even for an already-gone
    /// session.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let claims = self
            .jwt_service
            .verify(refresh_token, "all", true)
            .map_err(|_| ApiError::unauthenticated("invalid refresh token"))?;

        self.session_repo.delete(&claims.id).await?;
        self.redis_client.evict_session_key(&claims.id).await.ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratelimit_grows_quadratically_then_caps() {
        assert_eq!(ratelimit_delay_seconds(0), 0);
        assert_eq!(ratelimit_delay_seconds(5), 25);
        assert_eq!(ratelimit_delay_seconds(10), 100);
        assert_eq!(ratelimit_delay_seconds(1000), SECONDS_PER_DAY);
    }

    #[test]
    fn ratelimit_sentinel_short_circuits_large_counts() {
        assert_eq!(ratelimit_delay_seconds(RATELIMIT_SENTINEL_COUNT + 1), SECONDS_PER_DAY);
    }

    #[test]
    fn email_heuristic_distinguishes_identifiers() {
        assert!(looks_like_email("alice@example.com"));
        assert!(!looks_like_email("alice"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("alice@localhost"));
    }
}
