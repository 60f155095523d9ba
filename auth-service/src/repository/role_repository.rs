//! # Role Store
//!
//! Data access layer for `userroles` (committed grants) and
//! `userroleinvitations` (pending invitations requiring acceptance,
//! used for the `admin` tag per the rank authorizer's rule table).

use shared::errors::ApiError;
use sqlx::PgPool;

use crate::domain::{RoleGrant, RoleInvitation};

#[derive(Debug, Clone)]
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Grants
    // =========================================================================

    pub async fn grant(&self, userid: &str, role_name: &str) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO userroles (userid, role_name) VALUES ($1, $2) ON CONFLICT (userid, role_name) DO NOTHING",
        )
        .bind(userid)
        .bind(role_name)
        .execute(&self.pool)
        .await
        .map_err(ApiError::DatabaseError)?;

        Ok(())
    }

    pub async fn revoke(&self, userid: &str, role_name: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM userroles WHERE userid = $1 AND role_name = $2")
            .bind(userid)
            .bind(role_name)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    pub async fn get_user_roles(&self, userid: &str) -> Result<Vec<RoleGrant>, ApiError> {
        sqlx::query_as::<_, RoleGrant>("SELECT * FROM userroles WHERE userid = $1")
            .bind(userid)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn has_role(&self, userid: &str, role_name: &str) -> Result<bool, ApiError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM userroles WHERE userid = $1 AND role_name = $2")
            .bind(userid)
            .bind(role_name)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(count.0 > 0)
    }

    pub async fn count_role(&self, role_name: &str) -> Result<i64, ApiError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM userroles WHERE role_name = $1")
            .bind(role_name)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(count.0)
    }

    pub async fn delete_user_roles(&self, userid: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM userroles WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Invitations
    // =========================================================================

    pub async fn invite(&self, invitation: &RoleInvitation) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO userroleinvitations (userid, role, invited_by, creation_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (userid, role) DO UPDATE
            SET invited_by = EXCLUDED.invited_by, creation_time = EXCLUDED.creation_time
            "#,
        )
        .bind(&invitation.userid)
        .bind(&invitation.role)
        .bind(&invitation.invited_by)
        .bind(invitation.creation_time)
        .execute(&self.pool)
        .await
        .map_err(ApiError::DatabaseError)?;

        Ok(())
    }

    pub async fn get_invitation(&self, userid: &str, role: &str) -> Result<Option<RoleInvitation>, ApiError> {
        sqlx::query_as::<_, RoleInvitation>("SELECT * FROM userroleinvitations WHERE userid = $1 AND role = $2")
            .bind(userid)
            .bind(role)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn get_user_invitations(&self, userid: &str) -> Result<Vec<RoleInvitation>, ApiError> {
        sqlx::query_as::<_, RoleInvitation>("SELECT * FROM userroleinvitations WHERE userid = $1")
            .bind(userid)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    /// Deletes any outstanding invitation for `(userid, role)`, used both
    /// to accept (grant happens separately) and to clear stale
    /// invitations when a role is later revoked outright.
    pub async fn delete_invitation(&self, userid: &str, role: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM userroleinvitations WHERE userid = $1 AND role = $2")
            .bind(userid)
            .bind(role)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    pub async fn delete_user_invitations(&self, userid: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM userroleinvitations WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }

    /// GC sweep: deletes invitations older than `before`.
    pub async fn delete_before(&self, before: i64) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM userroleinvitations WHERE creation_time < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}
