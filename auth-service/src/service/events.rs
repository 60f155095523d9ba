//! # Event Dispatcher (C12)
//!
//! An in-process fan-out built on `tokio::sync::broadcast`: the
//! lifecycle engine publishes a [`LifecycleEvent`] and whoever is
//! listening reacts. Two kinds of listener are spawned from `main.rs`
//! alongside the HTTP server:
//!
//! - the delete-cascade worker, which clears role grants and API keys
//!   for a deleted user;
//! - three GC sweepers, which periodically delete approvals, resets,
//!   and role invitations older than `gc_age_seconds`.
//!
//! Both run for the lifetime of the process; there is no explicit
//! shutdown signal, consistent with the other long-lived background
//! tasks (secret refresher, health poller).

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::events::LifecycleEvent;
use crate::repository::{ApiKeyRepository, ApprovalRepository, ResetRepository, RoleRepository};

const BROADCAST_CAPACITY: usize = 1024;

/// Wraps the broadcast channel lifecycle events travel over. Cheap to
/// clone; every clone shares the same underlying sender.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Publishes `event`. A publish with no subscribers is not an
    /// error: nothing is listening yet during startup, or a consumer
    /// task has simply fallen behind and dropped the lagging receiver.
    pub fn publish(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

/// Spawns the delete-cascade worker: on every `user.delete` event,
/// drains role grants, role invitations, and API keys owned by that
/// userid. A single `DELETE ... WHERE userid = $1` removes every
/// matching row in one round trip, so there is no need for an
/// iterative batch-and-retry loop the way a non-relational store
/// would require.
pub fn spawn_delete_cascade_worker(
    dispatcher: &EventDispatcher,
    role_repo: RoleRepository,
    apikey_repo: ApiKeyRepository,
) -> JoinHandle<()> {
    let mut rx = dispatcher.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !event.is_user_delete() {
                        continue;
                    }
                    let userid = event.userid().to_string();
                    let roles = role_repo.delete_user_roles(&userid).await.unwrap_or(0);
                    let invitations = role_repo.delete_user_invitations(&userid).await.unwrap_or(0);
                    let keys = apikey_repo.delete_user_keys(&userid).await.unwrap_or(0);
                    tracing::info!(
                        userid = %userid,
                        roles_removed = roles,
                        invitations_removed = invitations,
                        keys_removed = keys,
                        "delete cascade drained"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "delete cascade worker lagged, some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Spawns the three GC sweepers as a single periodic task: every
/// `interval`, delete approvals/resets/invitations whose timestamp
/// predates `now - gc_age_seconds`.
pub fn spawn_gc_sweepers(
    approval_repo: ApprovalRepository,
    reset_repo: ResetRepository,
    role_repo: RoleRepository,
    gc_age_seconds: i64,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let cutoff = chrono::Utc::now().timestamp() - gc_age_seconds;

            match approval_repo.delete_before(cutoff).await {
                Ok(n) if n > 0 => tracing::info!(removed = n, "gc: stale unapproved registrations swept"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "gc: approval sweep failed"),
            }
            match reset_repo.delete_before(cutoff).await {
                Ok(n) if n > 0 => tracing::info!(removed = n, "gc: stale reset codes swept"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "gc: reset sweep failed"),
            }
            match role_repo.delete_before(cutoff).await {
                Ok(n) if n > 0 => tracing::info!(removed = n, "gc: stale role invitations swept"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "gc: invitation sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let dispatcher = EventDispatcher::new();
        dispatcher.publish(LifecycleEvent::created("user", "user1", 1000));
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.publish(LifecycleEvent::deleted("user", "user1", 1000));
        let event = rx.recv().await.unwrap();
        assert!(event.is_user_delete());
    }
}
