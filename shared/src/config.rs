//! # Application Configuration
//!
//! Centralized configuration loaded from environment variables, following
//! the enumerated options of §6: token lifetimes, the confirmation-code
//! subsystem's timing knobs, the OTP cipher bundle, and the email URL
//! templates used by the lifecycle engine.
//!
//! ## Environment Variable Format
//!
//! Variables use the `APP_` prefix with `__` as nested separator, plus a
//! handful of Docker-friendly bare overrides (`DATABASE_URL`, `REDIS_URL`,
//! `JWT_SECRET`, `OTP_KEYS`).

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,
    pub service_name: String,
    pub environment: AppEnvironment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,
}

/// Token issuer (C7) configuration. `keys` is the signing keyset,
/// newest-first: `"<key_id>:<base64 32 bytes>"` entries, same shape as
/// [`crate::otp`]'s cipher bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub keys: Vec<String>,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_access_time")]
    pub access_time_seconds: i64,
    #[serde(default = "default_refresh_time")]
    pub refresh_time_seconds: i64,
    /// Clock-skew tolerance applied to every validation.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_seconds: i64,
}

/// OTP/TOTP and cipher-ring configuration (C8).
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    #[serde(default = "default_otp_issuer")]
    pub issuer: String,
    /// `otpkey` secret bundle, `[0]` newest; see [`crate::otp::cipher::CipherRing`].
    pub keys: Vec<String>,
    #[serde(default = "default_hb_interval")]
    pub hb_interval_seconds: u64,
    #[serde(default = "default_hb_max_fail")]
    pub hb_max_fail: u32,
    #[serde(default = "default_otp_refresh")]
    pub refresh_seconds: u64,
}

/// The knobs of §6's auth/lifecycle table that aren't token- or OTP-specific.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// `refreshcache`: session_id -> key_hash TTL in the KV cache.
    #[serde(default = "default_refresh_cache")]
    pub refresh_cache_seconds: i64,
    /// `confirmtime`: max age of a pending approval before commit rejects.
    #[serde(default = "default_confirm_time")]
    pub confirm_time_seconds: i64,
    pub password_reset_enabled: bool,
    #[serde(default = "default_password_reset_time")]
    pub password_reset_time_seconds: i64,
    #[serde(default = "default_pass_reset_delay")]
    pub pass_reset_delay_seconds: i64,
    /// `invitationtime`: max age of a role invitation.
    #[serde(default = "default_invitation_time")]
    pub invitation_time_seconds: i64,
    /// `usercachetime`: TTL for read-through user caches.
    #[serde(default = "default_user_cache_time")]
    pub user_cache_time_seconds: i64,
    #[serde(default)]
    pub new_login_email: bool,
    #[serde(default = "default_password_min_size")]
    pub password_min_size: usize,
    #[serde(default)]
    pub user_approval_required: bool,
    /// GC cutoff for approvals/resets/invitations, e.g. 72h.
    #[serde(default = "default_gc_age")]
    pub gc_age_seconds: i64,
}

/// URL templates substituted with `{{.Userid}}`/`{{.Key}}` by the mailer.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub url_email_change: String,
    pub url_forgot_pass: String,
    pub url_new_user: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Staging,
    Production,
}

impl Default for AppEnvironment {
    fn default() -> Self {
        Self::Development
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let otp_keys = std::env::var("OTP_KEYS").ok().map(|v| {
            v.split(',')
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        });
        let jwt_keys = std::env::var("JWT_KEYS").ok().map(|v| {
            v.split(',')
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        });

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 0)?
            .set_default("environment", "development")?
            .set_default("service_name", "identity-core")?
            .set_default("jwt.issuer", default_issuer())?
            .set_default("jwt.access_time_seconds", default_access_time())?
            .set_default("jwt.refresh_time_seconds", default_refresh_time())?
            .set_default("jwt.clock_skew_seconds", default_clock_skew())?
            .set_default("otp.issuer", default_otp_issuer())?
            .set_default("otp.hb_interval_seconds", default_hb_interval() as i64)?
            .set_default("otp.hb_max_fail", default_hb_max_fail() as i64)?
            .set_default("otp.refresh_seconds", default_otp_refresh() as i64)?
            .set_default("auth.refresh_cache_seconds", default_refresh_cache())?
            .set_default("auth.confirm_time_seconds", default_confirm_time())?
            .set_default("auth.password_reset_enabled", true)?
            .set_default("auth.password_reset_time_seconds", default_password_reset_time())?
            .set_default("auth.pass_reset_delay_seconds", default_pass_reset_delay())?
            .set_default("auth.invitation_time_seconds", default_invitation_time())?
            .set_default("auth.user_cache_time_seconds", default_user_cache_time())?
            .set_default("auth.new_login_email", true)?
            .set_default("auth.password_min_size", default_password_min_size() as i64)?
            .set_default("auth.user_approval_required", false)?
            .set_default("auth.gc_age_seconds", default_gc_age())?
            .set_default(
                "email.url_email_change",
                "http://localhost:8080/u/email/verify?userid={{.Userid}}&key={{.Key}}",
            )?
            .set_default(
                "email.url_forgot_pass",
                "http://localhost:8080/u/password/forgot/reset?userid={{.Userid}}&key={{.Key}}",
            )?
            .set_default(
                "email.url_new_user",
                "http://localhost:8080/u/confirm?userid={{.Userid}}&key={{.Key}}",
            )?
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("service_name", std::env::var("SERVICE_NAME").ok())?
            .set_override_option("jwt.keys", jwt_keys)?
            .set_override_option("otp.keys", otp_keys)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    #[inline]
    pub fn is_development(&self) -> bool {
        self.environment == AppEnvironment::Development
    }

    #[inline]
    pub fn is_production(&self) -> bool {
        self.environment == AppEnvironment::Production
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_max_lifetime() -> u64 {
    1800
}
fn default_redis_pool_size() -> u32 {
    10
}
fn default_issuer() -> String {
    "identity-core".to_string()
}
fn default_access_time() -> i64 {
    900 // 15 min
}
fn default_refresh_time() -> i64 {
    604_800 // 7 days
}
fn default_clock_skew() -> i64 {
    60
}
fn default_otp_issuer() -> String {
    "identity-core".to_string()
}
fn default_hb_interval() -> u64 {
    300
}
fn default_hb_max_fail() -> u32 {
    3
}
fn default_otp_refresh() -> u64 {
    3600
}
fn default_refresh_cache() -> i64 {
    604_800
}
fn default_confirm_time() -> i64 {
    86_400 // 24h to commit a registration
}
fn default_password_reset_time() -> i64 {
    3600
}
fn default_pass_reset_delay() -> i64 {
    900
}
fn default_invitation_time() -> i64 {
    172_800 // 48h
}
fn default_user_cache_time() -> i64 {
    300
}
fn default_password_min_size() -> usize {
    8
}
fn default_gc_age() -> i64 {
    259_200 // 72h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_development() {
        assert_eq!(AppEnvironment::default(), AppEnvironment::Development);
    }

    #[test]
    fn environment_variants_are_distinct() {
        assert_ne!(AppEnvironment::Development, AppEnvironment::Production);
        assert_ne!(AppEnvironment::Staging, AppEnvironment::Production);
    }
}
