//! # Session Store (C2)
//!
//! Data access layer for the `sessions` table. Sessions are looked up by
//! `session_id` on every authenticated request's refresh/logout path, so
//! the KV cache (`shared::redis_client::RedisClient::cache_session_key`)
//! sits in front of `get_by_id` on the hot path; this repository is the
//! fallback and the authority for mutation.

use shared::errors::ApiError;
use sqlx::PgPool;

use crate::domain::Session;

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, session: &Session) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, userid, key_hash, time, auth_time, ipaddr, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.userid)
        .bind(&session.key_hash)
        .bind(session.time)
        .bind(session.auth_time)
        .bind(&session.ipaddr)
        .bind(&session.user_agent)
        .execute(&self.pool)
        .await
        .map_err(ApiError::DatabaseError)?;

        Ok(())
    }

    pub async fn get_by_id(&self, session_id: &str) -> Result<Option<Session>, ApiError> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn get_user_sessions(&self, userid: &str) -> Result<Vec<Session>, ApiError> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE userid = $1 ORDER BY time DESC")
            .bind(userid)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    /// Persists a rotated key hash and bumped `time`, as applied in
    /// memory by [`Session::rehash_key`].
    pub async fn rehash_key(&self, session_id: &str, key_hash: &str, time: i64) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE sessions SET key_hash = $1, time = $2 WHERE session_id = $3")
            .bind(key_hash)
            .bind(time)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("session"));
        }
        Ok(())
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    /// Deletes the subset of `session_ids` owned by `userid`, ignoring
    /// ids that belong to someone else or don't exist.
    pub async fn delete_sessions(&self, userid: &str, session_ids: &[String]) -> Result<u64, ApiError> {
        if session_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM sessions WHERE userid = $1 AND session_id = ANY($2)")
            .bind(userid)
            .bind(session_ids)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }

    pub async fn delete_user_sessions(&self, userid: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}
