//! # Request Validation Helpers
//!
//! Thin wrapper around the `validator` crate plus the custom grammar
//! checks the identity core needs: username shape and role-tag shape.

use crate::errors::ApiError;
use serde::de::DeserializeOwned;
use validator::Validate;

/// Validates a request DTO that implements `Validate`.
pub fn validate_request<T: Validate>(data: &T) -> Result<(), ApiError> {
    data.validate().map_err(ApiError::ValidationError)
}

/// Parses JSON and validates in one step.
pub fn parse_and_validate<T: DeserializeOwned + Validate>(json: &str) -> Result<T, ApiError> {
    let data: T = serde_json::from_str(json).map_err(|e| ApiError::bad_request(e.to_string()))?;
    validate_request(&data)?;
    Ok(data)
}

pub mod validators {
    use validator::ValidationError;

    const BARE_ROLE_TAGS: [&str; 3] = ["admin", "system", "user"];
    const PREFIXED_ROLE_GROUPS: [&str; 3] = ["mod", "ban", "usr"];

    /// Validates that a string is not blank (empty or whitespace-only).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("blank"));
        }
        Ok(())
    }

    /// Username grammar: 3..127 printable, non-whitespace characters.
    pub fn valid_username(value: &str) -> Result<(), ValidationError> {
        let len = value.chars().count();
        if !(3..=127).contains(&len) {
            return Err(ValidationError::new("invalid_username_length"));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::new("invalid_username_chars"));
        }
        Ok(())
    }

    /// Role tag grammar: a bare tag (`admin`, `system`, `user`) or a
    /// prefixed tag `<prefix>.<group>` with `prefix` in `{mod, ban, usr}`.
    pub fn valid_role_tag(value: &str) -> Result<(), ValidationError> {
        if BARE_ROLE_TAGS.contains(&value) {
            return Ok(());
        }
        if let Some((prefix, group)) = value.split_once('.') {
            if PREFIXED_ROLE_GROUPS.contains(&prefix) && !group.is_empty() {
                return Ok(());
            }
        }
        Err(ValidationError::new("invalid_role_tag"))
    }

    /// API key / access token scope grammar: a space-separated set of
    /// capability tokens (e.g. `"gov.user.apikey:read"`), unrelated to the
    /// role tag grammar above. At least one non-blank token is required.
    pub fn valid_scope(value: &str) -> Result<(), ValidationError> {
        if value.split_whitespace().next().is_none() {
            return Err(ValidationError::new("invalid_scope"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::validators::*;

    #[test]
    fn not_blank_rejects_whitespace_only() {
        assert!(not_blank("hello").is_ok());
        assert!(not_blank("").is_err());
        assert!(not_blank("   ").is_err());
    }

    #[test]
    fn username_length_bounds() {
        assert!(valid_username("ab").is_err());
        assert!(valid_username("abc").is_ok());
        assert!(valid_username(&"a".repeat(127)).is_ok());
        assert!(valid_username(&"a".repeat(128)).is_err());
    }

    #[test]
    fn username_rejects_whitespace() {
        assert!(valid_username("bad name").is_err());
    }

    #[test]
    fn role_tag_accepts_bare_tags() {
        assert!(valid_role_tag("admin").is_ok());
        assert!(valid_role_tag("system").is_ok());
        assert!(valid_role_tag("user").is_ok());
    }

    #[test]
    fn role_tag_accepts_prefixed_groups() {
        assert!(valid_role_tag("mod.forums").is_ok());
        assert!(valid_role_tag("ban.spam").is_ok());
        assert!(valid_role_tag("usr.beta").is_ok());
    }

    #[test]
    fn role_tag_rejects_unknown_prefix() {
        assert!(valid_role_tag("owner.site").is_err());
        assert!(valid_role_tag("random").is_err());
        assert!(valid_role_tag("mod.").is_err());
    }

    #[test]
    fn scope_accepts_space_separated_tokens() {
        assert!(valid_scope("gov.user.apikey:read").is_ok());
        assert!(valid_scope("gov.user.apikey:read gov.user.apikey:write").is_ok());
    }

    #[test]
    fn scope_rejects_blank_input() {
        assert!(valid_scope("").is_err());
        assert!(valid_scope("   ").is_err());
    }
}
