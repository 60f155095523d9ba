//! # Credential Store (C1)
//!
//! Data access layer for the `users` table: the identity core's single
//! source of truth for credentials, profile fields, and OTP
//! configuration. Lookup is supported by both `userid` and `username`
//! (login accepts either a username or an email address; the email
//! lookup lives here too since both resolve to the same row).
//!
//! ## Error Handling
//!
//! | sqlx Error            | ApiError Variant      | HTTP Status |
//! |-----------------------|-----------------------|-------------|
//! | `RowNotFound`         | `NotFound`            | 404         |
//! | Unique constraint     | `Conflict`            | 409         |
//! | Other                 | `DatabaseError`       | 500         |

use shared::errors::ApiError;
use sqlx::PgPool;

use crate::domain::User;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts `user`. `ApiError::Conflict("username")`/`Conflict("email")`
    /// on a unique violation against either column.
    pub async fn insert(&self, user: &User) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                userid, username, pass_hash, otp_enabled, otp_secret, otp_backup,
                email, first_name, last_name, creation_time,
                failed_login_time, failed_login_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&user.userid)
        .bind(&user.username)
        .bind(&user.pass_hash)
        .bind(user.otp_enabled)
        .bind(&user.otp_secret)
        .bind(&user.otp_backup)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.creation_time)
        .bind(user.failed_login_time)
        .bind(user.failed_login_count)
        .execute(&self.pool)
        .await
        .map_err(|e| self.classify_unique_violation(e))?;

        Ok(())
    }

    fn classify_unique_violation(&self, err: sqlx::Error) -> ApiError {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                let resource = match db_err.constraint() {
                    Some(c) if c.contains("username") => "username",
                    Some(c) if c.contains("email") => "email",
                    _ => "user",
                };
                return ApiError::conflict(resource);
            }
        }
        ApiError::DatabaseError(err)
    }

    pub async fn get_by_id(&self, userid: &str) -> Result<Option<User>, ApiError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE userid = $1")
            .bind(userid)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, ApiError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(count.0 > 0)
    }

    pub async fn count_users(&self) -> Result<i64, ApiError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(count.0)
    }

    /// Updates `first_name`/`last_name` only. Username and email changes
    /// go through their own dedicated flows.
    pub async fn update_props(&self, userid: &str, first_name: &str, last_name: &str) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE users SET first_name = $1, last_name = $2 WHERE userid = $3")
            .bind(first_name)
            .bind(last_name)
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("user"));
        }
        Ok(())
    }

    pub async fn update_email(&self, userid: &str, email: &str) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE users SET email = $1 WHERE userid = $2")
            .bind(email)
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(|e| self.classify_unique_violation(e))?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("user"));
        }
        Ok(())
    }

    pub async fn rehash_pass(&self, userid: &str, pass_hash: &str) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE users SET pass_hash = $1 WHERE userid = $2")
            .bind(pass_hash)
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("user"));
        }
        Ok(())
    }

    /// Stores an encrypted OTP secret/backup pair without enabling OTP.
    /// Enabling happens in a separate commit step once the caller proves
    /// possession of the secret via a valid code.
    pub async fn generate_otp_secret(&self, userid: &str, otp_secret: &str, otp_backup: &str) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE users SET otp_secret = $1, otp_backup = $2, otp_enabled = false WHERE userid = $3")
            .bind(otp_secret)
            .bind(otp_backup)
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("user"));
        }
        Ok(())
    }

    pub async fn enable_otp(&self, userid: &str) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE users SET otp_enabled = true WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("user"));
        }
        Ok(())
    }

    pub async fn disable_otp(&self, userid: &str) -> Result<(), ApiError> {
        let result = sqlx::query("UPDATE users SET otp_enabled = false, otp_secret = NULL, otp_backup = NULL WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("user"));
        }
        Ok(())
    }

    pub async fn update_failed_login(&self, userid: &str, time: i64, count: i32) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET failed_login_time = $1, failed_login_count = $2 WHERE userid = $3")
            .bind(time)
            .bind(count)
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;
        Ok(())
    }

    pub async fn delete(&self, userid: &str) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM users WHERE userid = $1")
            .bind(userid)
            .execute(&self.pool)
            .await
            .map_err(ApiError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("user"));
        }
        Ok(())
    }
}
