//! # Lifecycle Engine (C10)
//!
//! Everything about a user's identity besides signing in: registration
//! and admin approval, profile/email/password changes, the OTP
//! enrollment dance, API key management, and account deletion. Every
//! mutating operation here either publishes a [`LifecycleEvent`] or
//! sends a best-effort notification (often both), following the same
//! "commit the mutation first, notify after, never let the
//! notification invert the outcome" discipline as [`super::auth_service::AuthService`].

use std::sync::Arc;

use chrono::Utc;
use shared::{
    auth::password::PasswordHasher,
    config::{AuthConfig, EmailConfig},
    crypto,
    errors::ApiError,
    mail::{render_url_template, send_best_effort, MailMessage, Mailer},
    otp::{SecretRefresherHandle, TotpManager},
};

use crate::domain::events::LifecycleEvent;
use crate::domain::{ApiKey, Approval, PublicUserProfile, ResetCode, ResetCodeKind, RoleGrant, SelfUserProfile, User};
use crate::repository::{ApiKeyRepository, ApprovalRepository, ResetRepository, RoleRepository, SessionRepository, UserRepository};

use super::events::EventDispatcher;

/// A deliberately loose email heuristic, matching
/// [`super::auth_service`]'s `Lookup` routing, good enough to decide
/// whether `ForgotPassword` should treat an unknown identifier as an
/// email (silent success) or a username (404).
fn looks_like_email(identifier: &str) -> bool {
    match identifier.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

#[derive(Clone)]
pub struct LifecycleService {
    user_repo: UserRepository,
    approval_repo: ApprovalRepository,
    reset_repo: ResetRepository,
    role_repo: RoleRepository,
    apikey_repo: ApiKeyRepository,
    session_repo: SessionRepository,
    password_hasher: Arc<PasswordHasher>,
    totp_manager: TotpManager,
    secret_refresher: SecretRefresherHandle,
    mailer: Arc<dyn Mailer>,
    events: EventDispatcher,
    auth_config: AuthConfig,
    email_config: EmailConfig,
}

impl LifecycleService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_repo: UserRepository,
        approval_repo: ApprovalRepository,
        reset_repo: ResetRepository,
        role_repo: RoleRepository,
        apikey_repo: ApiKeyRepository,
        session_repo: SessionRepository,
        password_hasher: Arc<PasswordHasher>,
        totp_manager: TotpManager,
        secret_refresher: SecretRefresherHandle,
        mailer: Arc<dyn Mailer>,
        events: EventDispatcher,
        auth_config: AuthConfig,
        email_config: EmailConfig,
    ) -> Self {
        Self {
            user_repo,
            approval_repo,
            reset_repo,
            role_repo,
            apikey_repo,
            session_repo,
            password_hasher,
            totp_manager,
            secret_refresher,
            mailer,
            events,
            auth_config,
            email_config,
        }
    }

    async fn decrypt_otp_field(&self, ciphertext: &str) -> Result<String, ApiError> {
        let ring = self
            .secret_refresher
            .current()
            .await
            .map_err(|_| ApiError::internal("otp cipher unavailable"))?;
        ring.decrypt(ciphertext).map_err(|_| ApiError::internal("otp field decryption failed"))
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    pub async fn get_self(&self, userid: &str) -> Result<SelfUserProfile, ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        Ok(SelfUserProfile::from(&user))
    }

    pub async fn get_public(&self, userid: &str) -> Result<PublicUserProfile, ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        Ok(PublicUserProfile::from(&user))
    }

    // =========================================================================
    // Registration: Register -> Approve/Deny -> Commit
    // =========================================================================

    /// `Register`: rejects a username/email already claimed by a
    /// committed user or by another pending registration, hashes the
    /// password, and files an `Approval` row. Returns the new
    /// registrant's userid.
    pub async fn register(
        &self,
        username: String,
        password: String,
        email: String,
        first_name: String,
        last_name: String,
    ) -> Result<String, ApiError> {
        if self.user_repo.username_exists(&username).await? {
            return Err(ApiError::conflict("username"));
        }
        if self.user_repo.get_by_email(&email).await?.is_some() {
            return Err(ApiError::conflict("email"));
        }

        let pass_hash = self.password_hasher.hash(&password)?;
        let now = Utc::now().timestamp();
        let approval = Approval::new(username, pass_hash, email, first_name, last_name, now);
        self.approval_repo.insert(&approval).await?;
        Ok(approval.userid)
    }

    /// `Approve`: stamps a fresh confirmation code and emails the
    /// commit link. Only meaningful when `auth.user_approval_required`
    /// is set; callers gate admission to this endpoint, not this method.
    pub async fn approve(&self, userid: &str) -> Result<(), ApiError> {
        let mut approval = self
            .approval_repo
            .get_by_id(userid)
            .await?
            .ok_or_else(|| ApiError::not_found("approval"))?;

        let now = Utc::now().timestamp();
        let code = approval.rehash_code(now);
        self.approval_repo.set_approved(userid, true, &approval.code_hash, approval.code_time).await?;

        let link = render_url_template(&self.email_config.url_new_user, userid, &code);
        send_best_effort(
            self.mailer.as_ref(),
            MailMessage {
                to: approval.email.clone(),
                action: "newuser",
                subject: "Confirm your account".to_string(),
                body: format!("Confirm your account to finish signing up: {link}"),
            },
        )
        .await;
        Ok(())
    }

    pub async fn deny(&self, userid: &str) -> Result<(), ApiError> {
        self.approval_repo.delete(userid).await
    }

    pub async fn list_approvals(&self, limit: i64, offset: i64) -> Result<Vec<Approval>, ApiError> {
        self.approval_repo.list_pending(limit, offset).await
    }

    /// `Commit`: the registrant clicks the link from `Approve`. Promotes
    /// the approval into a committed `User` row, grants the baseline
    /// `user` tag, and publishes a `create` event.
    pub async fn commit(&self, userid: &str, code: &str) -> Result<(), ApiError> {
        let approval = self
            .approval_repo
            .get_by_id(userid)
            .await?
            .ok_or_else(|| ApiError::not_found("approval"))?;

        let now = Utc::now().timestamp();
        if now > approval.code_time + self.auth_config.confirm_time_seconds {
            return Err(ApiError::bad_request("User approval expired"));
        }
        if !approval.validate_code(code) {
            return Err(ApiError::unauthenticated("invalid confirmation code"));
        }
        if !approval.approved {
            return Err(ApiError::forbidden("registration not yet approved"));
        }

        let user = approval.into_user(now);
        self.user_repo.insert(&user).await?;
        self.role_repo.grant(&user.userid, "user").await?;
        self.events.publish(LifecycleEvent::created("user", user.userid.clone(), now));
        self.approval_repo.delete(&user.userid).await?;
        Ok(())
    }

    /// Open Question (b)'s recognized exception: creates the very first
    /// user directly as `admin`, bypassing both the approval flow and
    /// the rank authorizer's invitation-only admin grant. A no-op once
    /// any user row exists, so `main.rs` can call this unconditionally
    /// on every startup.
    pub async fn bootstrap_admin(
        &self,
        username: String,
        password: String,
        email: String,
        first_name: String,
        last_name: String,
    ) -> Result<Option<String>, ApiError> {
        if self.user_repo.count_users().await? > 0 {
            return Ok(None);
        }

        let pass_hash = self.password_hasher.hash(&password)?;
        let now = Utc::now().timestamp();
        let user = User::new(username, pass_hash, email, first_name, last_name, now);
        self.user_repo.insert(&user).await?;
        self.role_repo.grant(&user.userid, "user").await?;
        self.role_repo.grant(&user.userid, "admin").await?;
        self.events.publish(LifecycleEvent::created("user", user.userid.clone(), now));
        Ok(Some(user.userid))
    }

    // =========================================================================
    // Profile / email / password
    // =========================================================================

    pub async fn update_profile(&self, userid: &str, first_name: &str, last_name: &str) -> Result<(), ApiError> {
        self.user_repo.update_props(userid, first_name, last_name).await?;
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        let now = Utc::now().timestamp();
        self.events.publish(
            LifecycleEvent::updated("user", userid.to_string(), now)
                .with_extra(serde_json::json!({"username": user.username})),
        );
        Ok(())
    }

    /// `UpdateEmail`: requires the current password, rejects an
    /// already-claimed new address, and files an "email" reset row
    /// carrying the new address as `params` until `CommitEmail` swaps
    /// it in.
    pub async fn update_email(&self, userid: &str, password: &str, new_email: &str) -> Result<(), ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        if !self.password_hasher.verify(password, &user.pass_hash)? {
            return Err(ApiError::unauthenticated("invalid password"));
        }
        if self.user_repo.get_by_email(new_email).await?.is_some() {
            return Err(ApiError::conflict("email"));
        }

        let now = Utc::now().timestamp();
        let mut reset = ResetCode::new(userid.to_string(), ResetCodeKind::Email, Some(new_email.to_string()), now);
        let code = reset.rehash_code(now);
        self.reset_repo.upsert(&reset).await?;

        let link = render_url_template(&self.email_config.url_email_change, userid, &code);
        send_best_effort(
            self.mailer.as_ref(),
            MailMessage {
                to: new_email.to_string(),
                action: "email",
                subject: "Confirm your new email address".to_string(),
                body: format!("Confirm your new email address: {link}"),
            },
        )
        .await;
        Ok(())
    }

    /// `CommitEmail`: requires the current password AND a live "email"
    /// reset code, then swaps the address and notifies the *previous*
    /// one, which is the only record the prior owner of this mailbox
    /// has that the account changed hands.
    pub async fn commit_email(&self, userid: &str, password: &str, code: &str) -> Result<(), ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        if !self.password_hasher.verify(password, &user.pass_hash)? {
            return Err(ApiError::unauthenticated("invalid password"));
        }

        let reset = self
            .reset_repo
            .get(userid, ResetCodeKind::Email)
            .await?
            .ok_or_else(|| ApiError::not_found("reset code"))?;
        let now = Utc::now().timestamp();
        if now > reset.code_time + self.auth_config.confirm_time_seconds {
            self.reset_repo.delete(userid, ResetCodeKind::Email).await?;
            return Err(ApiError::not_found("reset code"));
        }
        if !reset.validate_code(code) {
            return Err(ApiError::unauthenticated("invalid confirmation code"));
        }
        let new_email = reset.params.clone().ok_or_else(|| ApiError::internal("reset code missing target email"))?;

        self.user_repo.update_email(userid, &new_email).await?;
        self.reset_repo.delete(userid, ResetCodeKind::Email).await?;

        send_best_effort(
            self.mailer.as_ref(),
            MailMessage {
                to: user.email.clone(),
                action: "email",
                subject: "Your email address changed".to_string(),
                body: format!("The email address on account {} was just changed.", user.username),
            },
        )
        .await;
        self.events.publish(
            LifecycleEvent::updated("user", userid.to_string(), now).with_extra(serde_json::json!({"email_changed": true})),
        );
        Ok(())
    }

    /// `UpdatePassword`: rehashes the credential row only. Per the
    /// resolved Open Question (see DESIGN.md), this does not touch the
    /// reset-code store: an authenticated password change is
    /// unrelated to any in-flight `ForgotPassword` row.
    pub async fn update_password(&self, userid: &str, old_password: &str, new_password: &str) -> Result<(), ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        if !self.password_hasher.verify(old_password, &user.pass_hash)? {
            return Err(ApiError::unauthenticated("invalid password"));
        }
        let pass_hash = self.password_hasher.hash(new_password)?;
        self.user_repo.rehash_pass(userid, &pass_hash).await?;

        send_best_effort(
            self.mailer.as_ref(),
            MailMessage {
                to: user.email.clone(),
                action: "passchange",
                subject: "Your password was changed".to_string(),
                body: format!("The password on account {} was just changed.", user.username),
            },
        )
        .await;
        Ok(())
    }

    /// `ForgotPassword`: enumeration-hardened. An unknown email address
    /// returns success silently; an unknown username is a 404 (the
    /// identifier shapes are distinguishable to a caller regardless, so
    /// there's nothing left to hide). A still-cooling-down existing
    /// reset row also returns success silently rather than resending.
    pub async fn forgot_password(&self, identifier: &str) -> Result<(), ApiError> {
        if !self.auth_config.password_reset_enabled {
            return Err(ApiError::forbidden("password reset is disabled"));
        }

        let is_email = looks_like_email(identifier);
        let user = if is_email {
            self.user_repo.get_by_email(identifier).await?
        } else {
            self.user_repo.get_by_username(identifier).await?
        };
        let user = match user {
            Some(u) => u,
            None if is_email => return Ok(()),
            None => return Err(ApiError::not_found("user")),
        };

        let now = Utc::now().timestamp();
        if let Some(existing) = self.reset_repo.get(&user.userid, ResetCodeKind::Pass).await? {
            if now < existing.code_time + self.auth_config.pass_reset_delay_seconds {
                return Ok(());
            }
        }

        let mut reset = ResetCode::new(user.userid.clone(), ResetCodeKind::Pass, None, now);
        let code = reset.rehash_code(now);
        self.reset_repo.upsert(&reset).await?;

        let link = render_url_template(&self.email_config.url_forgot_pass, &user.userid, &code);
        send_best_effort(
            self.mailer.as_ref(),
            MailMessage {
                to: user.email.clone(),
                action: "forgotpass",
                subject: "Reset your password".to_string(),
                body: format!("Reset your password: {link}"),
            },
        )
        .await;
        Ok(())
    }

    /// `ResetPassword`: validates the "pass" reset code within
    /// `password_reset_time_seconds`, rehashes, and deletes the row so
    /// it can't be replayed.
    pub async fn reset_password(&self, userid: &str, code: &str, new_password: &str) -> Result<(), ApiError> {
        let reset = self
            .reset_repo
            .get(userid, ResetCodeKind::Pass)
            .await?
            .ok_or_else(|| ApiError::not_found("reset code"))?;

        let now = Utc::now().timestamp();
        if now > reset.code_time + self.auth_config.password_reset_time_seconds {
            self.reset_repo.delete(userid, ResetCodeKind::Pass).await?;
            return Err(ApiError::not_found("reset code"));
        }
        if !reset.validate_code(code) {
            return Err(ApiError::unauthenticated("invalid reset code"));
        }

        let pass_hash = self.password_hasher.hash(new_password)?;
        self.user_repo.rehash_pass(userid, &pass_hash).await?;
        self.reset_repo.delete(userid, ResetCodeKind::Pass).await?;

        if let Ok(Some(user)) = self.user_repo.get_by_id(userid).await {
            send_best_effort(
                self.mailer.as_ref(),
                MailMessage {
                    to: user.email.clone(),
                    action: "passchange",
                    subject: "Your password was changed".to_string(),
                    body: format!("The password on account {} was just reset.", user.username),
                },
            )
            .await;
        }
        Ok(())
    }

    // =========================================================================
    // OTP lifecycle
    // =========================================================================

    /// `OTP add`: requires the password and that OTP is not already
    /// enabled. Generates and stores an encrypted secret/backup pair
    /// without enabling OTP; the backup code plaintext is revealed
    /// here and nowhere else. Returns `(enrollment_uri, backup_plaintext)`.
    pub async fn otp_add(&self, userid: &str, password: &str) -> Result<(String, String), ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        if !self.password_hasher.verify(password, &user.pass_hash)? {
            return Err(ApiError::unauthenticated("invalid password"));
        }
        if user.otp_enabled {
            return Err(ApiError::conflict("otp"));
        }

        let totp_secret = self.totp_manager.generate_secret(&user.username)?;
        let backup_plaintext = crypto::random_token(16);

        let ring = self
            .secret_refresher
            .current()
            .await
            .map_err(|_| ApiError::internal("otp cipher unavailable"))?;
        let secret_cipher = ring.encrypt(&totp_secret.secret_base32).map_err(|_| ApiError::internal("otp encryption failed"))?;
        let backup_cipher = ring.encrypt(&backup_plaintext).map_err(|_| ApiError::internal("otp encryption failed"))?;

        self.user_repo.generate_otp_secret(userid, &secret_cipher, &backup_cipher).await?;
        Ok((totp_secret.uri, backup_plaintext))
    }

    /// `OTP commit`: requires a pending (not-yet-enabled) secret and a
    /// currently-valid code, proving possession before OTP becomes
    /// mandatory on future logins.
    pub async fn otp_commit(&self, userid: &str, code: &str) -> Result<(), ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        if user.otp_enabled {
            return Err(ApiError::conflict("otp"));
        }
        let secret_cipher = user.otp_secret.as_deref().ok_or_else(|| ApiError::bad_request("otp not initialized"))?;
        let secret_base32 = self.decrypt_otp_field(secret_cipher).await?;
        if !self.totp_manager.check_code(&secret_base32, code, &user.username) {
            return Err(ApiError::unauthenticated("invalid otp code"));
        }
        self.user_repo.enable_otp(userid).await?;
        Ok(())
    }

    /// `OTP remove`: requires the password AND either a current TOTP
    /// code or the backup code.
    pub async fn otp_remove(
        &self,
        userid: &str,
        password: &str,
        otp_code: Option<&str>,
        otp_backup: Option<&str>,
    ) -> Result<(), ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        if !self.password_hasher.verify(password, &user.pass_hash)? {
            return Err(ApiError::unauthenticated("invalid password"));
        }
        if !user.otp_enabled {
            return Err(ApiError::bad_request("otp not enabled"));
        }

        let verified = match (otp_code.filter(|c| !c.is_empty()), otp_backup.filter(|b| !b.is_empty())) {
            (Some(code), _) => {
                let secret_cipher = user
                    .otp_secret
                    .as_deref()
                    .ok_or_else(|| ApiError::internal("otp enabled without a secret"))?;
                let secret_base32 = self.decrypt_otp_field(secret_cipher).await?;
                self.totp_manager.check_code(&secret_base32, code, &user.username)
            }
            (None, Some(backup)) => {
                let backup_cipher = user
                    .otp_backup
                    .as_deref()
                    .ok_or_else(|| ApiError::internal("otp enabled without a backup code"))?;
                let stored = self.decrypt_otp_field(backup_cipher).await?;
                stored == backup
            }
            (None, None) => false,
        };
        if !verified {
            return Err(ApiError::unauthenticated("invalid otp code or backup code"));
        }

        self.user_repo.disable_otp(userid).await?;
        Ok(())
    }

    // =========================================================================
    // API keys
    // =========================================================================

    pub async fn create_apikey(&self, userid: &str, scope: String, name: String, desc: String) -> Result<(ApiKey, String), ApiError> {
        let now = Utc::now().timestamp();
        let (key, plaintext) = ApiKey::new(userid, scope, name, desc, now);
        self.apikey_repo.insert(&key).await?;
        Ok((key, plaintext))
    }

    pub async fn list_apikeys(&self, userid: &str) -> Result<Vec<ApiKey>, ApiError> {
        self.apikey_repo.get_user_keys(userid).await
    }

    async fn owned_apikey(&self, userid: &str, keyid: &str) -> Result<ApiKey, ApiError> {
        let key = self.apikey_repo.get_by_id(keyid).await?.ok_or_else(|| ApiError::not_found("apikey"))?;
        if key.userid != userid {
            return Err(ApiError::forbidden("apikey belongs to another user"));
        }
        Ok(key)
    }

    pub async fn update_apikey(&self, userid: &str, keyid: &str, name: &str, desc: &str) -> Result<(), ApiError> {
        self.owned_apikey(userid, keyid).await?;
        self.apikey_repo.update_props(keyid, name, desc).await
    }

    pub async fn rotate_apikey(&self, userid: &str, keyid: &str) -> Result<String, ApiError> {
        let mut key = self.owned_apikey(userid, keyid).await?;
        let now = Utc::now().timestamp();
        let plaintext = key.rotate(now);
        self.apikey_repo.rotate(keyid, &key.key_hash, now).await?;
        Ok(plaintext)
    }

    pub async fn delete_apikey(&self, userid: &str, keyid: &str) -> Result<(), ApiError> {
        self.owned_apikey(userid, keyid).await?;
        self.apikey_repo.delete(keyid).await
    }

    /// `/apikey/check`: basic-auth (keyid, secret) lookup, Blake2b
    /// comparison, then intersects the caller's requested role tags
    /// against the key owner's actual grants. Returns the intersection.
    pub async fn check_apikey(&self, keyid: &str, secret: &str, requested_roles: &[String]) -> Result<Vec<String>, ApiError> {
        let key = self.apikey_repo.get_by_id(keyid).await?.ok_or_else(|| ApiError::unauthenticated("invalid api key"))?;
        if !key.validate_secret(secret) {
            return Err(ApiError::unauthenticated("invalid api key"));
        }

        let granted: Vec<RoleGrant> = self.role_repo.get_user_roles(&key.userid).await?;
        let granted_names: std::collections::HashSet<&str> = granted.iter().map(|g| g.role_name.as_str()).collect();
        Ok(requested_roles.iter().filter(|r| granted_names.contains(r.as_str())).cloned().collect())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn list_sessions(&self, userid: &str) -> Result<Vec<crate::domain::Session>, ApiError> {
        self.session_repo.get_user_sessions(userid).await
    }

    pub async fn revoke_all_sessions(&self, userid: &str) -> Result<(), ApiError> {
        self.session_repo.delete_user_sessions(userid).await.map(|_| ())
    }

    pub async fn revoke_sessions(&self, userid: &str, session_ids: &[String]) -> Result<(), ApiError> {
        self.session_repo.delete_sessions(userid, session_ids).await.map(|_| ())
    }

    // =========================================================================
    // Account deletion
    // =========================================================================

    /// `DeleteUser`: requires the username to match (a second factor
    /// beyond the session's bearer token) and the current password;
    /// refuses to delete an admin-bearing account. Sessions are killed
    /// synchronously; role grants/invitations/API keys are cleaned up
    /// asynchronously by the delete-cascade worker once the `delete`
    /// event is observed.
    pub async fn delete_user(&self, userid: &str, username: &str, password: &str) -> Result<(), ApiError> {
        let user = self.user_repo.get_by_id(userid).await?.ok_or_else(|| ApiError::not_found("user"))?;
        if user.username != username {
            return Err(ApiError::forbidden("username does not match"));
        }
        if !self.password_hasher.verify(password, &user.pass_hash)? {
            return Err(ApiError::unauthenticated("invalid password"));
        }
        if self.role_repo.has_role(userid, "admin").await? {
            return Err(ApiError::forbidden("cannot delete an admin-bearing account"));
        }

        self.session_repo.delete_user_sessions(userid).await?;
        self.user_repo.delete(userid).await?;

        let now = Utc::now().timestamp();
        self.events.publish(LifecycleEvent::deleted("user", userid.to_string(), now));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_heuristic_matches_auth_engine() {
        assert!(looks_like_email("alice@example.com"));
        assert!(!looks_like_email("alice"));
        assert!(!looks_like_email("alice@localhost"));
    }
}
