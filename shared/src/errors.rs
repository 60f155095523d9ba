//! # Application Error Types
//!
//! Unified error handling with automatic HTTP conversion, following the
//! error kinds laid out for the identity core: `Validation`, `Unauthenticated`,
//! `Forbidden`, `NotFound`, `Conflict`, `TooManyRequests`, `Internal`.
//!
//! Every variant carries a user-safe `message`; an optional `code` tag
//! (`otp_required`, `otp_backup_used`, ...) lets the UI branch on specific
//! conditions without parsing prose. Internal causes are logged but never
//! serialized to the client.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

pub type ApiResult<T> = Result<T, ApiError>;

/// Application error type with automatic HTTP status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body failed `validator` rules.
    #[error("validation error")]
    ValidationError(#[from] ValidationErrors),

    /// Generic 400 with a custom message, for checks that don't fit the
    /// `validator` derive pattern (reset-code length, role tag grammar, ...).
    /// Carries an optional `code` so the client can distinguish a specific
    /// condition (e.g. `otp_required`) without parsing the message.
    #[error("{message}")]
    BadRequest {
        message: String,
        code: Option<&'static str>,
    },

    /// Credential check failed (unknown user, bad password, bad OTP code).
    /// Carries an optional `code` so the client can distinguish
    /// `otp_required` from a plain bad password without string matching.
    #[error("{message}")]
    Unauthenticated {
        message: String,
        code: Option<&'static str>,
    },

    /// Authenticated, but not permitted to perform this action.
    #[error("{message}")]
    Forbidden { message: String },

    /// Resource does not exist, or (for reset codes) has expired/been consumed.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Unique-constraint violation translated to a user-facing message.
    #[error("{resource}")]
    Conflict { resource: String },

    /// Rate-limit cliff hit; carries the `Retry-After` value in seconds.
    #[error("too many requests")]
    TooManyRequests { retry_after_seconds: i64 },

    /// Database failure. Logged with its cause; client sees a generic 500.
    #[error("database error")]
    DatabaseError(#[from] sqlx::Error),

    /// KV-store failure. Best-effort call sites should not propagate this;
    /// authoritative paths do.
    #[error("cache error")]
    RedisError(#[from] redis::RedisError),

    /// Catch-all for everything else (crypto failures, encoding failures, ...).
    #[error("internal error")]
    InternalError { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: None,
        }
    }

    pub fn bad_request_coded(message: impl Into<String>, code: &'static str) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
            code: None,
        }
    }

    pub fn unauthenticated_coded(message: impl Into<String>, code: &'static str) -> Self {
        Self::Unauthenticated {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Maps a Postgres unique-violation on `users`/`userapprovals` into a
    /// `Conflict`; anything else passes through as `DatabaseError`.
    pub fn from_unique_violation(err: sqlx::Error, resource: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return Self::conflict(resource.to_string());
            }
        }
        Self::DatabaseError(err)
    }

    /// Stable machine-readable code. Falls back to the `code` carried by
    /// `Unauthenticated`/`BadRequest`, if any.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Unauthenticated { code, .. } => *code,
            Self::BadRequest { code, .. } => *code,
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::DatabaseError(_) | Self::RedisError(_) | Self::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::RedisError(_) | Self::InternalError { .. }
        )
    }
}

/// Error envelope sent to clients: `{ message, code, status }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(error: &ApiError) -> Self {
        let message = if error.is_server_error() {
            // Internal causes are never echoed to the client.
            "internal server error".to_string()
        } else {
            error.to_string()
        };

        Self {
            message,
            code: error.error_code().map(|c| c.to_string()),
            status: error.status_code().as_u16(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            tracing::error!(error = %self, "internal error");
        }

        let response = ErrorResponse::new(self);
        let mut builder = HttpResponse::build(self.status_code());

        if let Self::TooManyRequests {
            retry_after_seconds,
        } = self
        {
            builder.insert_header(("Retry-After", retry_after_seconds.to_string()));
        }

        builder.json(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_without_code_serializes_no_code() {
        let err = ApiError::unauthenticated("bad credentials");
        let resp = ErrorResponse::new(&err);
        assert_eq!(resp.code, None);
        assert_eq!(resp.status, 401);
    }

    #[test]
    fn otp_required_carries_its_code() {
        let err = ApiError::bad_request_coded("otp code required", "otp_required");
        assert_eq!(err.error_code(), Some("otp_required"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn server_errors_hide_their_message() {
        let err = ApiError::internal("leaked connection string");
        let resp = ErrorResponse::new(&err);
        assert_eq!(resp.message, "internal server error");
    }

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(ApiError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthenticated("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::TooManyRequests { retry_after_seconds: 5 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
