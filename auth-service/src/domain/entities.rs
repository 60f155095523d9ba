//! # Core Entities
//!
//! Database-mapped entities for the identity core's relational schema:
//! `users`, `sessions`, `userresets`, `userapprovals`, `userroles`,
//! `userroleinvitations`, `apikeys`. All primary identifiers are opaque
//! strings (`userid`/`session_id`/`keyid`), not UUIDs: the service hands
//! these out to callers directly, and some of them carry embedded
//! structure (a `session_id`/`keyid` is prefixed by its owning userid).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use shared::crypto;

/// A credential row (C1). `pass_hash` is always present; `otp_secret`/
/// `otp_backup` are only present once `GenerateOTPSecret` has run, and
/// are always ciphertext (see `shared::otp::CipherRing`), never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub userid: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub pass_hash: String,
    pub otp_enabled: bool,
    #[serde(skip_serializing)]
    pub otp_secret: Option<String>,
    #[serde(skip_serializing)]
    pub otp_backup: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub creation_time: i64,
    #[serde(skip_serializing)]
    pub failed_login_time: i64,
    #[serde(skip_serializing)]
    pub failed_login_count: i32,
}

impl User {
    /// Builds a new user row: generates the opaque userid and stamps
    /// `creation_time`. Does not persist; callers pass the result to a
    /// repository `create` call.
    pub fn new(
        username: String,
        pass_hash: String,
        email: String,
        first_name: String,
        last_name: String,
        now: i64,
    ) -> Self {
        Self {
            userid: crypto::random_opaque_id(23),
            username,
            pass_hash,
            otp_enabled: false,
            otp_secret: None,
            otp_backup: None,
            email,
            first_name,
            last_name,
            creation_time: now,
            failed_login_time: 0,
            failed_login_count: 0,
        }
    }
}

/// Public profile: what `GET /u/id/{id}` returns to anyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUserProfile {
    pub userid: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub creation_time: i64,
}

impl From<&User> for PublicUserProfile {
    fn from(u: &User) -> Self {
        Self {
            userid: u.userid.clone(),
            username: u.username.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            creation_time: u.creation_time,
        }
    }
}

/// Self profile: what `GET /u` returns to the authenticated owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfUserProfile {
    pub userid: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub otp_enabled: bool,
    pub creation_time: i64,
}

impl From<&User> for SelfUserProfile {
    fn from(u: &User) -> Self {
        Self {
            userid: u.userid.clone(),
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            otp_enabled: u.otp_enabled,
            creation_time: u.creation_time,
        }
    }
}

/// A session row (C2). `session_id` always begins with its owner's
/// `userid` followed by `.`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub session_id: String,
    pub userid: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// Last refresh/rotation time.
    pub time: i64,
    /// Last fresh password+OTP login time.
    pub auth_time: i64,
    pub ipaddr: Option<String>,
    pub user_agent: Option<String>,
}

impl Session {
    /// Builds a new session and its plaintext key. The key is never
    /// persisted in plaintext; only `key_hash` is stored.
    pub fn new(userid: &str, ipaddr: Option<String>, user_agent: Option<String>, now: i64) -> (Self, String) {
        let plaintext_key = crypto::random_token(32);
        let key_hash = crypto::keyed_hash(&plaintext_key);
        let session_id = format!("{userid}.{}", crypto::random_opaque_id(8));
        (
            Self {
                session_id,
                userid: userid.to_string(),
                key_hash,
                time: now,
                auth_time: now,
                ipaddr,
                user_agent,
            },
            plaintext_key,
        )
    }

    /// Issues a fresh session key, updating `key_hash` and `time` in
    /// place. Returns the new plaintext key.
    pub fn rehash_key(&mut self, now: i64) -> String {
        let plaintext_key = crypto::random_token(32);
        self.key_hash = crypto::keyed_hash(&plaintext_key);
        self.time = now;
        plaintext_key
    }

    pub fn validate_key(&self, plaintext: &str) -> bool {
        crypto::verify_keyed_hash(plaintext, &self.key_hash)
    }

    /// The userid encoded as the prefix of `session_id`, without a
    /// lookup. Callers MUST verify this matches the authenticated
    /// principal before trusting a caller-supplied `session_id`.
    pub fn owner_of(session_id: &str) -> Option<&str> {
        session_id.split_once('.').map(|(userid, _)| userid)
    }
}

/// The kind of a confirmation code (C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "lowercase")]
pub enum ResetCodeKind {
    Email,
    Pass,
}

impl ResetCodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Pass => "pass",
        }
    }
}

/// A confirmation-code row (C3). At most one outstanding row per
/// `(userid, kind)`; `params` carries kind-specific context (e.g. the
/// pending new email address for an "email" reset).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResetCode {
    pub userid: String,
    pub kind: ResetCodeKind,
    #[serde(skip_serializing)]
    pub code_hash: String,
    pub code_time: i64,
    pub params: Option<String>,
}

impl ResetCode {
    pub fn new(userid: String, kind: ResetCodeKind, params: Option<String>, now: i64) -> Self {
        Self {
            userid,
            kind,
            code_hash: String::new(),
            code_time: now,
            params,
        }
    }

    /// Mints a fresh plaintext code, stores its hash, and bumps
    /// `code_time`. Returns the plaintext so the caller can embed it in
    /// a confirmation link or response.
    pub fn rehash_code(&mut self, now: i64) -> String {
        let plaintext = crypto::random_token(16);
        self.code_hash = crypto::keyed_hash(&plaintext);
        self.code_time = now;
        plaintext
    }

    pub fn validate_code(&self, plaintext: &str) -> bool {
        crypto::verify_keyed_hash(plaintext, &self.code_hash)
    }
}

/// A pending registration awaiting admin decision (C4).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Approval {
    pub userid: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub pass_hash: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub creation_time: i64,
    pub approved: bool,
    #[serde(skip_serializing)]
    pub code_hash: String,
    pub code_time: i64,
}

impl Approval {
    pub fn new(
        username: String,
        pass_hash: String,
        email: String,
        first_name: String,
        last_name: String,
        now: i64,
    ) -> Self {
        Self {
            userid: crypto::random_opaque_id(23),
            username,
            pass_hash,
            email,
            first_name,
            last_name,
            creation_time: now,
            approved: false,
            code_hash: String::new(),
            code_time: now,
        }
    }

    pub fn rehash_code(&mut self, now: i64) -> String {
        let plaintext = crypto::random_token(16);
        self.code_hash = crypto::keyed_hash(&plaintext);
        self.code_time = now;
        plaintext
    }

    pub fn validate_code(&self, plaintext: &str) -> bool {
        crypto::verify_keyed_hash(plaintext, &self.code_hash)
    }

    /// Promotes this approval to a full `User`, preserving the
    /// registration-time fields and password hash.
    pub fn into_user(self, now: i64) -> User {
        User {
            userid: self.userid,
            username: self.username,
            pass_hash: self.pass_hash,
            otp_enabled: false,
            otp_secret: None,
            otp_backup: None,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            creation_time: now,
            failed_login_time: 0,
            failed_login_count: 0,
        }
    }
}

/// An API key (C5). `keyid` always begins with its owner's userid.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub keyid: String,
    pub userid: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub scope: String,
    pub name: String,
    pub desc: String,
    pub time: i64,
}

impl ApiKey {
    /// Builds a new API key and its plaintext secret.
    pub fn new(userid: &str, scope: String, name: String, desc: String, now: i64) -> (Self, String) {
        let plaintext = crypto::random_token(32);
        let key_hash = crypto::keyed_hash(&plaintext);
        let keyid = format!("{userid}.{}", crypto::random_opaque_id(12));
        (
            Self {
                keyid,
                userid: userid.to_string(),
                key_hash,
                scope,
                name,
                desc,
                time: now,
            },
            plaintext,
        )
    }

    /// Rotates the secret, returning the new plaintext. The previous
    /// secret stops validating immediately.
    pub fn rotate(&mut self, now: i64) -> String {
        let plaintext = crypto::random_token(32);
        self.key_hash = crypto::keyed_hash(&plaintext);
        self.time = now;
        plaintext
    }

    pub fn validate_secret(&self, plaintext: &str) -> bool {
        crypto::verify_keyed_hash(plaintext, &self.key_hash)
    }
}

/// A role grant: `(userid, role_name)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleGrant {
    pub userid: String,
    pub role_name: String,
}

/// A pending role invitation: `(userid, role)` plus who issued it and
/// when, so it can be expired against `invitation_time_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleInvitation {
    pub userid: String,
    pub role: String,
    pub invited_by: String,
    pub creation_time: i64,
}

impl RoleInvitation {
    pub fn is_expired(&self, now: i64, invitation_time_seconds: i64) -> bool {
        now > self.creation_time + invitation_time_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_generates_31_char_userid() {
        let user = User::new(
            "xorkevin".to_string(),
            "hash".to_string(),
            "test@example.com".to_string(),
            "Kevin".to_string(),
            "Wang".to_string(),
            1000,
        );
        assert_eq!(user.userid.len(), 31);
        assert!(!user.otp_enabled);
        assert_eq!(user.failed_login_count, 0);
    }

    #[test]
    fn session_id_encodes_owner_prefix() {
        let (session, _key) = Session::new("user1", None, None, 1000);
        assert!(session.session_id.starts_with("user1."));
        assert_eq!(Session::owner_of(&session.session_id), Some("user1"));
    }

    #[test]
    fn session_key_roundtrips() {
        let (mut session, key) = Session::new("user1", None, None, 1000);
        assert!(session.validate_key(&key));
        assert!(!session.validate_key("wrong-key"));

        let new_key = session.rehash_key(2000);
        assert!(session.validate_key(&new_key));
        assert!(!session.validate_key(&key));
        assert_eq!(session.time, 2000);
    }

    #[test]
    fn reset_code_roundtrips() {
        let mut reset = ResetCode::new("user1".to_string(), ResetCodeKind::Pass, None, 1000);
        let code = reset.rehash_code(1000);
        assert!(reset.validate_code(&code));
        assert!(!reset.validate_code("wrong"));
    }

    #[test]
    fn approval_promotes_to_user() {
        let approval = Approval::new(
            "xorkevin2".to_string(),
            "hash".to_string(),
            "test2@example.com".to_string(),
            "K".to_string(),
            "W".to_string(),
            1000,
        );
        let userid = approval.userid.clone();
        let user = approval.into_user(2000);
        assert_eq!(user.userid, userid);
        assert_eq!(user.username, "xorkevin2");
        assert_eq!(user.creation_time, 2000);
    }

    #[test]
    fn apikey_id_encodes_owner_prefix() {
        let (key, _secret) = ApiKey::new("user1", "gov.user".to_string(), "ci".to_string(), "".to_string(), 1000);
        assert!(key.keyid.starts_with("user1."));
    }

    #[test]
    fn apikey_rotation_invalidates_previous_secret() {
        let (mut key, secret) = ApiKey::new("user1", "gov.user".to_string(), "ci".to_string(), "".to_string(), 1000);
        assert!(key.validate_secret(&secret));
        let new_secret = key.rotate(2000);
        assert!(key.validate_secret(&new_secret));
        assert!(!key.validate_secret(&secret));
    }

    #[test]
    fn invitation_expiry() {
        let invite = RoleInvitation {
            userid: "user1".to_string(),
            role: "mod.forums".to_string(),
            invited_by: "admin1".to_string(),
            creation_time: 1000,
        };
        assert!(!invite.is_expired(1000 + 100, 172_800));
        assert!(invite.is_expired(1000 + 200_000, 172_800));
    }
}
