//! # KV Cache (C6)
//!
//! Thin async wrapper around a Redis `ConnectionManager`, plus the
//! three namespaces the identity core actually uses:
//!
//! | Namespace | Key | Purpose |
//! |-----------|-----|---------|
//! | `users/*` | `users/<userid>` | Read-through cache of hot user rows |
//! | `sessions/*` | `sessions/<session_id>` | Cached `key_hash` for session validation |
//! | `otpcodes/*` | `otpcodes/<userid>:<code>` | Replay guard for used TOTP codes (120s) |
//!
//! `ConnectionManager` reconnects automatically, so the client is cheap
//! to clone and safe to share across workers.

use crate::config::RedisConfig;
use crate::errors::ApiError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

/// The replay-guard TTL for a presented OTP code, per §8's testable
/// property: the same code may not be reused within 120 seconds.
pub const OTP_REPLAY_GUARD_SECONDS: u64 = 120;

#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn new(config: &RedisConfig) -> Result<Self, ApiError> {
        info!(url = %config.url, "connecting to redis");

        let client = redis::Client::open(config.url.as_str()).map_err(ApiError::RedisError)?;
        let conn = ConnectionManager::new(client).await.map_err(ApiError::RedisError)?;

        info!("redis connection established");
        Ok(Self { conn })
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    pub async fn set<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), ApiError> {
        let serialized = serde_json::to_string(value).map_err(|e| ApiError::internal(e.to_string()))?;
        let mut conn = self.conn.clone();

        match ttl {
            Some(duration) => {
                conn.set_ex::<_, _, ()>(key, &serialized, duration.as_secs())
                    .await
                    .map_err(ApiError::RedisError)?;
            }
            None => {
                conn.set::<_, _, ()>(key, &serialized)
                    .await
                    .map_err(ApiError::RedisError)?;
            }
        }

        Ok(())
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ApiError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(ApiError::RedisError)?;

        match value {
            Some(s) => {
                let deserialized = serde_json::from_str(&s).map_err(|e| ApiError::internal(e.to_string()))?;
                Ok(Some(deserialized))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await.map_err(ApiError::RedisError)?;
        Ok(deleted > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(ApiError::RedisError)
    }

    pub async fn incr(&self, key: &str) -> Result<i64, ApiError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await.map_err(ApiError::RedisError)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        conn.expire(key, ttl.as_secs() as i64).await.map_err(ApiError::RedisError)
    }

    pub async fn ping(&self) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(ApiError::RedisError)?;
        Ok(())
    }

    // =========================================================================
    // `sessions/*`: cached key_hash for session validation
    // =========================================================================

    /// Caches `key_hash` for `session_id` so `ValidateKey` can skip the
    /// database on the hot path. Best-effort: call sites should
    /// log-and-continue on error rather than fail the request.
    pub async fn cache_session_key(
        &self,
        session_id: &str,
        key_hash: &str,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        self.set(&format!("sessions/{session_id}"), &key_hash, Some(ttl)).await
    }

    pub async fn get_cached_session_key(&self, session_id: &str) -> Result<Option<String>, ApiError> {
        self.get(&format!("sessions/{session_id}")).await
    }

    pub async fn evict_session_key(&self, session_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("sessions/{session_id}")).await?;
        Ok(())
    }

    // =========================================================================
    // `users/*`: read-through user cache
    // =========================================================================

    pub async fn cache_user<T: serde::Serialize>(
        &self,
        userid: &str,
        user: &T,
        ttl: Duration,
    ) -> Result<(), ApiError> {
        self.set(&format!("users/{userid}"), user, Some(ttl)).await
    }

    pub async fn get_cached_user<T: serde::de::DeserializeOwned>(
        &self,
        userid: &str,
    ) -> Result<Option<T>, ApiError> {
        self.get(&format!("users/{userid}")).await
    }

    pub async fn evict_user(&self, userid: &str) -> Result<(), ApiError> {
        self.delete(&format!("users/{userid}")).await?;
        Ok(())
    }

    // =========================================================================
    // `otpcodes/*`: TOTP replay guard
    // =========================================================================

    /// Marks `code` as used for `userid`. A presented code found already
    /// marked must be rejected ("OTP code already used") per §8.
    pub async fn mark_otp_code_used(&self, userid: &str, code: &str) -> Result<(), ApiError> {
        let key = format!("otpcodes/{userid}:{code}");
        self.set(&key, &true, Some(Duration::from_secs(OTP_REPLAY_GUARD_SECONDS)))
            .await
    }

    pub async fn is_otp_code_used(&self, userid: &str, code: &str) -> Result<bool, ApiError> {
        self.exists(&format!("otpcodes/{userid}:{code}")).await
    }
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient").finish_non_exhaustive()
    }
}
