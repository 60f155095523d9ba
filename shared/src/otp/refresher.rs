//! # Secret Refresher (C8)
//!
//! A single-threaded event loop owns the current [`CipherRing`]. A
//! periodic tick re-reads the secret bundle via a caller-supplied
//! `reload` closure; if the bundle's first key id differs from the
//! ring currently held, the new ring is installed (old keys remain
//! reachable through the ring's own decrypt-with-any-key behavior, so
//! in-flight decrypts of secrets written under a retiring key keep
//! working across the swap). Peers never touch the ring directly;
//! they ask for it over a request/response channel, so a reload can
//! never race a reader mid-decrypt.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::cipher::CipherRing;

enum Message {
    Current(oneshot::Sender<Arc<CipherRing>>),
    Health(oneshot::Sender<bool>),
}

/// Handle used by the rest of the service to request the live cipher
/// ring or query refresher health. Cheap to clone.
#[derive(Clone)]
pub struct SecretRefresherHandle {
    tx: mpsc::Sender<Message>,
}

impl SecretRefresherHandle {
    /// Requests the currently installed cipher ring.
    pub async fn current(&self) -> Result<Arc<CipherRing>, RefresherError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Message::Current(reply_tx))
            .await
            .map_err(|_| RefresherError::Stopped)?;
        reply_rx.await.map_err(|_| RefresherError::Stopped)
    }

    /// True iff a cipher has been loaded at least once and the refresher
    /// is not past its consecutive-failure threshold.
    pub async fn health(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Message::Health(reply_tx)).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RefresherError {
    #[error("secret refresher task has stopped")]
    Stopped,
}

/// Owns the cipher ring and the reload loop. Call [`SecretRefresher::spawn`]
/// to start the background task and obtain a [`SecretRefresherHandle`].
pub struct SecretRefresher;

impl SecretRefresher {
    /// Spawns the refresher loop. `reload` is called at startup and on
    /// every tick of `interval`; its return value is the current secret
    /// bundle (newest-first `"<key_id>:<base64>"` entries, same shape
    /// read from [`crate::config::OtpConfig::keys`]). `hb_max_fail`
    /// consecutive reload failures mark the refresher unhealthy.
    pub fn spawn<F>(
        mut reload: F,
        interval: Duration,
        hb_max_fail: u32,
    ) -> (JoinHandle<()>, SecretRefresherHandle)
    where
        F: FnMut() -> Vec<String> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(32);

        let handle = tokio::spawn(async move {
            let mut ring: Option<Arc<CipherRing>> = None;
            let mut consecutive_failures: u32 = 0;
            let mut ticker = tokio::time::interval(interval);

            // Load once before serving any requests.
            match CipherRing::from_bundle(&reload()) {
                Ok(r) => ring = Some(Arc::new(r)),
                Err(e) => {
                    tracing::error!(error = %e, "initial otp cipher load failed");
                    consecutive_failures += 1;
                }
            }

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let bundle = reload();
                        let current_key_id = ring.as_ref().map(|r| r.active_key_id().to_string());
                        match CipherRing::from_bundle(&bundle) {
                            Ok(new_ring) => {
                                if current_key_id.as_deref() != Some(new_ring.active_key_id()) {
                                    tracing::info!(key_id = %new_ring.active_key_id(), "rotating otp cipher");
                                }
                                ring = Some(Arc::new(new_ring));
                                consecutive_failures = 0;
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "otp cipher reload failed");
                                consecutive_failures += 1;
                            }
                        }
                    }
                    msg = rx.recv() => {
                        match msg {
                            Some(Message::Current(reply)) => {
                                if let Some(r) = &ring {
                                    let _ = reply.send(r.clone());
                                }
                            }
                            Some(Message::Health(reply)) => {
                                let healthy = ring.is_some() && consecutive_failures < hb_max_fail;
                                let _ = reply.send(healthy);
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        (handle, SecretRefresherHandle { tx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(key_id: &str) -> Vec<String> {
        vec![CipherRing::generate_bundle_entry(key_id)]
    }

    #[tokio::test]
    async fn serves_current_ring_after_startup() {
        let (_task, handle) = SecretRefresher::spawn(move || bundle("k1"), Duration::from_secs(3600), 3);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let ring = handle.current().await.unwrap();
        assert_eq!(ring.active_key_id(), "k1");
        assert!(handle.health().await);
    }

    #[tokio::test]
    async fn unhealthy_when_bundle_never_loads() {
        let (_task, handle) = SecretRefresher::spawn(Vec::new, Duration::from_secs(3600), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.health().await);
    }
}
