//! # Data Transfer Objects (DTOs)
//!
//! Request bodies for every route in the HTTP surface. Response bodies
//! mostly reuse the domain's own [`crate::domain::SelfUserProfile`] /
//! [`crate::domain::PublicUserProfile`] / [`crate::domain::ApiKey`], since
//! those types are already shaped the way a caller should see them
//! (sensitive fields `#[serde(skip_serializing)]`), so there is no
//! separate response-DTO layer duplicating that shape.
//!
//! Field-level validation goes through `validator`; grammar checks that
//! don't fit its derive macros (role tag shape, username shape) reuse
//! [`shared::validation::validators`].

use serde::Deserialize;
use validator::Validate;

use shared::validation::validators::{not_blank, valid_role_tag, valid_scope, valid_username};

// =============================================================================
// Registration
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "valid_username"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(custom(function = "not_blank"))]
    pub first_name: String,
    #[validate(custom(function = "not_blank"))]
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfirmRequest {
    #[validate(custom(function = "not_blank"))]
    pub userid: String,
    #[validate(custom(function = "not_blank"))]
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalListQuery {
    #[serde(default = "default_amount")]
    pub amount: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_amount() -> i64 {
    32
}

// =============================================================================
// Login / session
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequestDto {
    /// A username or email address; the engine decides which by shape.
    #[validate(custom(function = "not_blank"))]
    pub identifier: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    #[serde(default)]
    pub otp_code: Option<String>,
    #[serde(default)]
    pub otp_backup: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RefreshTokenBody {
    /// Fallback carrier for the refresh token when no cookie is sent.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// =============================================================================
// Profile / email / password
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(custom(function = "not_blank"))]
    pub first_name: String,
    #[validate(custom(function = "not_blank"))]
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateEmailRequest {
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    #[validate(email(message = "invalid email format"))]
    pub new_email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[validate(custom(function = "not_blank"))]
    pub userid: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    #[validate(custom(function = "not_blank"))]
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 1, message = "old password is required"))]
    pub old_password: String,
    #[validate(length(min = 1, message = "new password is required"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(custom(function = "not_blank"))]
    pub identifier: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(custom(function = "not_blank"))]
    pub userid: String,
    #[validate(custom(function = "not_blank"))]
    pub key: String,
    #[validate(length(min = 1, message = "new password is required"))]
    pub new_password: String,
}

// =============================================================================
// OTP
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OtpAddRequest {
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OtpAddResponse {
    pub uri: String,
    pub backup: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OtpVerifyRequest {
    #[validate(custom(function = "not_blank"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OtpRemoveRequest {
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    #[serde(default)]
    pub otp_code: Option<String>,
    #[serde(default)]
    pub otp_backup: Option<String>,
}

// =============================================================================
// Rank
// =============================================================================

fn valid_role_tags(tags: &std::collections::BTreeSet<String>) -> Result<(), validator::ValidationError> {
    for tag in tags {
        valid_role_tag(tag)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateRankRequest {
    #[serde(default)]
    #[validate(custom(function = "valid_role_tags"))]
    pub add: std::collections::BTreeSet<String>,
    #[serde(default)]
    #[validate(custom(function = "valid_role_tags"))]
    pub remove: std::collections::BTreeSet<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(custom(function = "valid_role_tag"))]
    pub role: String,
}

// =============================================================================
// API keys
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(custom(function = "valid_scope"))]
    pub scope: String,
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateApiKeyRequest {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiKeySecretResponse {
    pub keyid: String,
    pub secret: String,
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RevokeSessionsRequest {
    pub session_ids: Vec<String>,
}

// =============================================================================
// Account deletion
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeleteUserRequest {
    #[validate(custom(function = "not_blank"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_rejects_bad_email() {
        let req = RegisterRequest {
            username: "xorkevin".to_string(),
            password: "hunter2hunter2".to_string(),
            email: "not-an-email".to_string(),
            first_name: "Kevin".to_string(),
            last_name: "Wang".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn register_request_rejects_short_username() {
        let req = RegisterRequest {
            username: "ab".to_string(),
            password: "hunter2hunter2".to_string(),
            email: "a@example.com".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn update_rank_request_rejects_unknown_tag() {
        let req = UpdateRankRequest {
            add: ["owner.site".to_string()].into_iter().collect(),
            remove: Default::default(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn update_rank_request_accepts_known_tags() {
        let req = UpdateRankRequest {
            add: ["mod.forums".to_string()].into_iter().collect(),
            remove: ["usr.beta".to_string()].into_iter().collect(),
        };
        assert!(req.validate().is_ok());
    }
}
