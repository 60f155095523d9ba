//! # Approval Store (C4)
//!
//! Data access layer for the `userapprovals` table: pending
//! registrations awaiting an admin's `Approve`/`Deny` decision, and the
//! confirmation code the registrant uses to finalize (`Commit`) an
//! approved registration.

use shared::errors::ApiError;
use sqlx::PgPool;

use crate::domain::Approval;

#[derive(Debug, Clone)]
pub struct ApprovalRepository {
    pool: PgPool,
}

impl ApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts `approval`. `ApiError::Conflict` on a unique violation
    /// against `username`/`email`, matching the credential store's
    /// own uniqueness so a pending registration can't squat a name a
    /// committed user already holds, or vice versa.
    pub async fn insert(&self, approval: &Approval) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO userapprovals (
                userid, username, pass_hash, email, first_name, last_name,
                creation_time, approved, code_hash, code_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&approval.userid)
        .bind(&approval.username)
        .bind(&approval.pass_hash)
        .bind(&approval.email)
        .bind(&approval.first_name)
        .bind(&approval.last_name)
        .bind(approval.creation_time)
        .bind(approval.approved)
        .bind(&approval.code_hash)
        .bind(approval.code_time)
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::from_unique_violation(e, "username or email"))?;

        Ok(())
    }

    pub async fn get_by_id(&self, userid: &str) -> Result<Option<Approval>, ApiError> {
        sqlx::query_as::<_, Approval>("SELECT * FROM userapprovals WHERE userid = $1")
            .bind(userid)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn list_pending(&self, limit: i64, offset: i64) -> Result<Vec<Approval>, ApiError> {
        sqlx::query_as::<_, Approval>(
            "SELECT * FROM userapprovals WHERE approved = false ORDER BY creation_time ASC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::DatabaseError)
    }

    pub async fn set_approved(&self, userid: &str, approved: bool, code_hash: &str, code_time: i64) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE userapprovals SET approved = $1, code_hash = $2, code_time = $3 WHERE userid = $4",
        )
        .bind(approved)
        .bind(code_hash)
        .bind(code_time)
        .bind(userid)
        .execute(&self.pool)
        .await
        .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("approval"));
        }
        Ok(())
    }

    pub async fn delete(&self, userid: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM userapprovals WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    /// GC sweep: deletes unapproved rows older than `before`.
    pub async fn delete_before(&self, before: i64) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM userapprovals WHERE approved = false AND creation_time < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}
