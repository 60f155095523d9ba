//! # API Key Store (C5)
//!
//! Data access layer for the `apikeys` table. Keys are validated over
//! HTTP basic auth against `/apikey/check`, so `get_by_id` sits on a
//! latency-sensitive path; no caching layer sits in front of it since
//! key checks are comparatively rare next to session refreshes.

use shared::errors::ApiError;
use sqlx::PgPool;

use crate::domain::ApiKey;

#[derive(Debug, Clone)]
pub struct ApiKeyRepository {
    pool: PgPool,
}

impl ApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, key: &ApiKey) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO apikeys (keyid, userid, key_hash, scope, name, desc, time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&key.keyid)
        .bind(&key.userid)
        .bind(&key.key_hash)
        .bind(&key.scope)
        .bind(&key.name)
        .bind(&key.desc)
        .bind(key.time)
        .execute(&self.pool)
        .await
        .map_err(ApiError::DatabaseError)?;

        Ok(())
    }

    pub async fn get_by_id(&self, keyid: &str) -> Result<Option<ApiKey>, ApiError> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM apikeys WHERE keyid = $1")
            .bind(keyid)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn get_user_keys(&self, userid: &str) -> Result<Vec<ApiKey>, ApiError> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM apikeys WHERE userid = $1 ORDER BY time DESC")
            .bind(userid)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn update_props(&self, keyid: &str, name: &str, desc: &str) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE apikeys SET name = $1, desc = $2 WHERE keyid = $3")
            .bind(name)
            .bind(desc)
            .bind(keyid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("apikey"));
        }
        Ok(())
    }

    pub async fn rotate(&self, keyid: &str, key_hash: &str, time: i64) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE apikeys SET key_hash = $1, time = $2 WHERE keyid = $3")
            .bind(key_hash)
            .bind(time)
            .bind(keyid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("apikey"));
        }
        Ok(())
    }

    pub async fn delete(&self, keyid: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM apikeys WHERE keyid = $1")
            .bind(keyid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    pub async fn delete_user_keys(&self, userid: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM apikeys WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}
