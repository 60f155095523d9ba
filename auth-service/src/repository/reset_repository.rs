//! # Reset Code Store (C3)
//!
//! Data access layer for the `userresets` table, keyed by `(userid, kind)`.
//! A given user has at most one outstanding code per kind at a time: a
//! fresh `ForgotPassword`/`UpdateEmail` call replaces whatever row was
//! there, invalidating the previous code.

use shared::errors::ApiError;
use sqlx::PgPool;

use crate::domain::{ResetCode, ResetCodeKind};

#[derive(Debug, Clone)]
pub struct ResetRepository {
    pool: PgPool,
}

impl ResetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts the `(userid, kind)` row, replacing any prior outstanding
    /// code of the same kind.
    pub async fn upsert(&self, reset: &ResetCode) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO userresets (userid, kind, code_hash, code_time, params)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (userid, kind) DO UPDATE
            SET code_hash = EXCLUDED.code_hash, code_time = EXCLUDED.code_time, params = EXCLUDED.params
            "#,
        )
        .bind(&reset.userid)
        .bind(reset.kind)
        .bind(&reset.code_hash)
        .bind(reset.code_time)
        .bind(&reset.params)
        .execute(&self.pool)
        .await
        .map_err(ApiError::DatabaseError)?;

        Ok(())
    }

    pub async fn get(&self, userid: &str, kind: ResetCodeKind) -> Result<Option<ResetCode>, ApiError> {
        sqlx::query_as::<_, ResetCode>("SELECT * FROM userresets WHERE userid = $1 AND kind = $2")
            .bind(userid)
            .bind(kind)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn delete(&self, userid: &str, kind: ResetCodeKind) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM userresets WHERE userid = $1 AND kind = $2")
            .bind(userid)
            .bind(kind)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    pub async fn delete_user_resets(&self, userid: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM userresets WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    /// GC sweep: deletes rows older than `before` (unix seconds),
    /// returning the number removed.
    pub async fn delete_before(&self, before: i64) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM userresets WHERE code_time < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}
