//! # Lifecycle Events (C12)
//!
//! A single generic event enum covers every entity lifecycle transition
//! the identity core cares about (user create/update/delete, session
//! create/delete, approval commit, role grant/revoke, ...). Handlers
//! subscribe by `namespace` rather than by a proliferation of concrete
//! event types; the dispatcher (`service::events::EventDispatcher`)
//! fans a single broadcast channel out to whichever consumers are
//! listening (delete cascade, best-effort email, audit log).

use serde::{Deserialize, Serialize};

/// Common interface for lifecycle events, mirroring how other system
/// components expose `occurred_at`/`aggregate_id` for logging and
/// ordering without requiring a handler to match on every concrete
/// variant.
pub trait DomainEvent: Send + Sync {
    fn event_type(&self) -> &'static str;
    fn occurred_at(&self) -> i64;
    fn aggregate_id(&self) -> String;
}

/// A lifecycle transition for some entity, keyed by `namespace`
/// (`"user"`, `"session"`, `"approval"`, `"role"`, `"apikey"`, ...).
/// `extra` carries variant-specific context that handlers can inspect
/// without the dispatcher needing a dedicated struct per transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LifecycleEvent {
    Create {
        namespace: &'static str,
        userid: String,
        occurred_at: i64,
        extra: serde_json::Value,
    },
    Update {
        namespace: &'static str,
        userid: String,
        occurred_at: i64,
        extra: serde_json::Value,
    },
    Delete {
        namespace: &'static str,
        userid: String,
        occurred_at: i64,
        extra: serde_json::Value,
    },
}

impl LifecycleEvent {
    pub fn created(namespace: &'static str, userid: impl Into<String>, now: i64) -> Self {
        Self::Create {
            namespace,
            userid: userid.into(),
            occurred_at: now,
            extra: serde_json::Value::Null,
        }
    }

    pub fn updated(namespace: &'static str, userid: impl Into<String>, now: i64) -> Self {
        Self::Update {
            namespace,
            userid: userid.into(),
            occurred_at: now,
            extra: serde_json::Value::Null,
        }
    }

    pub fn deleted(namespace: &'static str, userid: impl Into<String>, now: i64) -> Self {
        Self::Delete {
            namespace,
            userid: userid.into(),
            occurred_at: now,
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_extra(mut self, value: serde_json::Value) -> Self {
        match &mut self {
            Self::Create { extra, .. } | Self::Update { extra, .. } | Self::Delete { extra, .. } => *extra = value,
        }
        self
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Create { namespace, .. } | Self::Update { namespace, .. } | Self::Delete { namespace, .. } => {
                namespace
            }
        }
    }

    pub fn userid(&self) -> &str {
        match self {
            Self::Create { userid, .. } | Self::Update { userid, .. } | Self::Delete { userid, .. } => userid,
        }
    }

    /// True for the `Delete` variant with `namespace == "user"`: this is
    /// the trigger the delete-cascade worker listens for.
    pub fn is_user_delete(&self) -> bool {
        matches!(self, Self::Delete { namespace: "user", .. })
    }
}

impl DomainEvent for LifecycleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    fn occurred_at(&self) -> i64 {
        match self {
            Self::Create { occurred_at, .. } | Self::Update { occurred_at, .. } | Self::Delete { occurred_at, .. } => {
                *occurred_at
            }
        }
    }

    fn aggregate_id(&self) -> String {
        self.userid().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_delete_is_recognized() {
        let event = LifecycleEvent::deleted("user", "user1", 1000);
        assert!(event.is_user_delete());
        assert_eq!(event.event_type(), "delete");
        assert_eq!(event.aggregate_id(), "user1");
    }

    #[test]
    fn non_user_delete_is_not_cascade_trigger() {
        let event = LifecycleEvent::deleted("session", "user1", 1000);
        assert!(!event.is_user_delete());
    }

    #[test]
    fn extra_payload_roundtrips_through_variants() {
        let event = LifecycleEvent::created("apikey", "user1", 1000)
            .with_extra(serde_json::json!({"keyid": "user1.abc"}));
        match &event {
            LifecycleEvent::Create { extra, .. } => {
                assert_eq!(extra["keyid"], "user1.abc");
            }
            _ => panic!("expected Create variant"),
        }
    }

    #[test]
    fn serializes_with_op_tag() {
        let event = LifecycleEvent::updated("user", "user1", 1000);
        let json = serde_json::to_string(&event).expect("serialization should succeed");
        assert!(json.contains("\"op\":\"update\""));
    }
}
