//! Single-flight refresh coordination
//!
//! Exactly one token refresh call may be in flight system-wide. The
//! first caller to hit a 401 runs the refresh; every concurrent caller
//! parks on the in-flight outcome and shares it, success or failure.
//! The in-flight slot is owned by an explicit coordinator object the
//! client constructs once - there is no module-level global.

use std::future::Future;

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use terralab_core::ports::AuthGrant;

/// Failure of a refresh flight, shared verbatim with every parked caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    /// HTTP status of the rejection, when a response was received
    pub status: Option<u16>,
    /// Description of the failure
    pub message: String,
}

/// Outcome of a refresh flight
pub type RefreshOutcome = Result<AuthGrant, RefreshFailure>;

/// Coordinates the single-flight refresh
///
/// The slot holds the broadcast sender of the in-flight refresh; callers
/// finding it occupied subscribe and await the shared outcome. The slot
/// resets only after the in-flight refresh settles.
pub struct RefreshCoordinator {
    inflight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
}

impl RefreshCoordinator {
    /// Creates a coordinator with no flight in progress
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(None),
        }
    }

    /// Runs `refresh_fn` single-flight
    ///
    /// If no refresh is in flight, this caller becomes the initiator:
    /// the closure runs, and its outcome is broadcast to every caller
    /// that parked in the meantime. If a refresh is already in flight,
    /// the closure is dropped unexecuted and the in-flight outcome is
    /// awaited instead.
    pub async fn run<F, Fut>(&self, refresh_fn: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome>,
    {
        // Either claim the slot or subscribe to the current flight. The
        // lock is held only to inspect the slot, never across the
        // refresh call itself.
        let receiver = {
            let mut slot = self.inflight.lock().await;
            match slot.as_ref() {
                Some(sender) => Some(sender.subscribe()),
                None => {
                    let (sender, _) = broadcast::channel(1);
                    *slot = Some(sender);
                    None
                }
            }
        };

        if let Some(mut receiver) = receiver {
            debug!("Refresh already in flight; parking caller");
            return match receiver.recv().await {
                Ok(outcome) => outcome,
                Err(_) => Err(RefreshFailure {
                    status: None,
                    message: "Refresh flight ended without an outcome".to_string(),
                }),
            };
        }

        debug!("Starting refresh flight");
        let outcome = refresh_fn().await;

        // Settle: release parked callers and free the slot.
        let mut slot = self.inflight.lock().await;
        if let Some(sender) = slot.take() {
            // Send fails when no caller parked; that is fine.
            let _ = sender.send(outcome.clone());
        }

        outcome
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn grant(token: &str) -> AuthGrant {
        AuthGrant {
            access_token: token.to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_in_secs: Some(3600),
            profile: None,
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_flight() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .run(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the flight open so the other callers park.
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(grant("fresh-token"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.unwrap().access_token, "fresh-token");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared_by_all_parked_callers() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .run(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err(RefreshFailure {
                            status: Some(401),
                            message: "refresh token revoked".to_string(),
                        })
                    })
                    .await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(
                outcome.unwrap_err(),
                RefreshFailure {
                    status: Some(401),
                    message: "refresh token revoked".to_string(),
                }
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sequential_flights_each_run() {
        let coordinator = RefreshCoordinator::new();
        let calls = AtomicU32::new(0);

        for i in 0..2 {
            let outcome = coordinator
                .run(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(grant(&format!("token-{}", i)))
                })
                .await;
            assert_eq!(outcome.unwrap().access_token, format!("token-{}", i));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slot_resets_after_failure() {
        let coordinator = RefreshCoordinator::new();

        let first = coordinator
            .run(|| async {
                Err(RefreshFailure {
                    status: None,
                    message: "network down".to_string(),
                })
            })
            .await;
        assert!(first.is_err());

        // A later caller gets a fresh flight, not the stale failure.
        let second = coordinator.run(|| async { Ok(grant("recovered")) }).await;
        assert_eq!(second.unwrap().access_token, "recovered");
    }
}
