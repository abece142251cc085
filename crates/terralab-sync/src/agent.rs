//! Sync agent - replays queued requests when connectivity returns
//!
//! The agent reads the whole queue, orders it by priority (descending,
//! ties broken by enqueue order), and replays each record sequentially
//! against the replayer port. Success deletes the record; any failure
//! leaves it queued for the next pass - records are never dropped
//! silently. Delivery is therefore at-least-once: the agent does not
//! deduplicate, and idempotence is the backend's (or caller's) concern.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use terralab_core::domain::QueuedRequest;
use terralab_core::events::{SessionEvent, SessionEvents};
use terralab_core::ports::{Connectivity, ReplayError, RequestQueue, RequestReplayer};

// ============================================================================
// SyncReport
// ============================================================================

/// Outcome of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records replayed and removed
    pub replayed: usize,
    /// Records that failed (non-auth) and stay queued
    pub failed: usize,
    /// Records that hit an auth failure; the pass stops on the first one
    pub auth_failures: usize,
    /// Records still in the queue after the pass
    pub remaining: usize,
    /// True when the pass was skipped because the host is offline
    pub skipped_offline: bool,
}

/// Command accepted by the agent's run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Drain the queue now, regardless of the poll timer
    SyncNow,
}

// ============================================================================
// SyncAgent
// ============================================================================

/// Drains the offline request queue in priority order
pub struct SyncAgent {
    queue: Arc<dyn RequestQueue>,
    replayer: Arc<dyn RequestReplayer>,
    connectivity: Arc<dyn Connectivity>,
    events: Arc<dyn SessionEvents>,
}

impl SyncAgent {
    /// Creates an agent over the given ports
    pub fn new(
        queue: Arc<dyn RequestQueue>,
        replayer: Arc<dyn RequestReplayer>,
        connectivity: Arc<dyn Connectivity>,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        Self {
            queue,
            replayer,
            connectivity,
            events,
        }
    }

    /// Runs one drain pass
    ///
    /// No-op while offline. A 401 from a replay stops the pass (every
    /// later record would hit the same wall) and is surfaced in the
    /// report; deciding what a dead session means is the session
    /// layer's job, not the agent's.
    pub async fn sync_pending_requests(&self) -> anyhow::Result<SyncReport> {
        if !self.connectivity.is_online() {
            debug!("Offline; skipping sync pass");
            return Ok(SyncReport {
                skipped_offline: true,
                ..SyncReport::default()
            });
        }

        let mut pending = self.queue.list_all().await?;
        if pending.is_empty() {
            debug!("Request queue is empty");
            return Ok(SyncReport::default());
        }

        sort_for_replay(&mut pending);
        let total = pending.len();
        info!(count = total, "Replaying queued requests");

        let mut report = SyncReport::default();

        for record in &pending {
            match self.replayer.replay(record).await {
                Ok(()) => {
                    self.queue.remove(record.id).await?;
                    self.events
                        .publish(SessionEvent::RequestReplayed { id: record.id });
                    debug!(id = record.id, url = %record.url, "Replayed queued request");
                    report.replayed += 1;
                }
                Err(ReplayError::Unauthorized { message }) => {
                    warn!(
                        id = record.id,
                        message = %message,
                        "Replay unauthorized; stopping pass and leaving queue intact"
                    );
                    report.auth_failures += 1;
                    break;
                }
                Err(ReplayError::Failed { message }) => {
                    // Leave the record for the next pass; deleting on
                    // failure would silently lose the user's work.
                    warn!(id = record.id, message = %message, "Replay failed; record stays queued");
                    report.failed += 1;
                }
            }
        }

        report.remaining = total - report.replayed;
        info!(
            replayed = report.replayed,
            failed = report.failed,
            remaining = report.remaining,
            "Sync pass finished"
        );
        Ok(report)
    }

    /// Main loop: drains on a poll interval and on explicit commands
    ///
    /// Runs until the command channel closes (sender dropped). Each tick
    /// drains only when the host reports online; a `SyncNow` command
    /// still consults the connectivity gate (the drain itself is a no-op
    /// offline).
    pub async fn run(&self, mut commands: mpsc::Receiver<SyncCommand>, poll_interval: Duration) {
        info!(
            poll_ms = poll_interval.as_millis() as u64,
            "Sync agent starting"
        );

        let mut timer = tokio::time::interval(poll_interval);
        let mut was_online = self.connectivity.is_online();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(SyncCommand::SyncNow) => {
                            info!("Explicit sync requested");
                            if let Err(err) = self.sync_pending_requests().await {
                                warn!(error = %err, "Sync pass failed");
                            }
                        }
                        None => {
                            info!("Command channel closed, sync agent shutting down");
                            break;
                        }
                    }
                }

                _ = timer.tick() => {
                    let online = self.connectivity.is_online();
                    if online && !was_online {
                        info!("Connectivity restored; draining request queue");
                    }
                    if online {
                        if let Err(err) = self.sync_pending_requests().await {
                            warn!(error = %err, "Sync pass failed");
                        }
                    }
                    was_online = online;
                }
            }
        }

        info!("Sync agent stopped");
    }
}

/// Orders records for replay: priority descending, enqueue order within
/// a priority level
fn sort_for_replay(records: &mut [QueuedRequest]) {
    records.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use chrono::Utc;

    use terralab_core::domain::{NewQueuedRequest, RequestMethod};
    use terralab_core::events::CallbackEventBus;
    use terralab_core::ports::SharedConnectivity;

    use super::*;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MemoryQueue {
        next_id: AtomicI64,
        records: Mutex<Vec<QueuedRequest>>,
    }

    impl MemoryQueue {
        fn records(&self) -> Vec<QueuedRequest> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl RequestQueue for MemoryQueue {
        async fn enqueue(&self, request: NewQueuedRequest) -> anyhow::Result<i64> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.records.lock().unwrap().push(QueuedRequest {
                id,
                method: request.method,
                url: request.url,
                body: request.body,
                headers: request.headers,
                enqueued_at: Utc::now(),
                priority: request.priority,
            });
            Ok(id)
        }

        async fn list_all(&self) -> anyhow::Result<Vec<QueuedRequest>> {
            Ok(self.records())
        }

        async fn remove(&self, id: i64) -> anyhow::Result<()> {
            self.records.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }
    }

    /// Replayer that records call order and fails scripted urls
    #[derive(Default)]
    struct ScriptedReplayer {
        failures: Mutex<HashMap<String, ReplayError>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedReplayer {
        fn fail(&self, url: &str, error: ReplayError) {
            self.failures.lock().unwrap().insert(url.to_string(), error);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl RequestReplayer for ScriptedReplayer {
        async fn replay(&self, request: &QueuedRequest) -> Result<(), ReplayError> {
            self.calls.lock().unwrap().push(request.url.clone());
            match self.failures.lock().unwrap().get(&request.url) {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    // ------------------------------------------------------------------
    // Harness
    // ------------------------------------------------------------------

    struct Harness {
        agent: SyncAgent,
        queue: Arc<MemoryQueue>,
        replayer: Arc<ScriptedReplayer>,
        connectivity: SharedConnectivity,
        events: Arc<Mutex<Vec<SessionEvent>>>,
    }

    fn harness(online: bool) -> Harness {
        let queue = Arc::new(MemoryQueue::default());
        let replayer = Arc::new(ScriptedReplayer::default());
        let connectivity = SharedConnectivity::new(online);
        let bus = Arc::new(CallbackEventBus::new());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        let agent = SyncAgent::new(
            queue.clone(),
            replayer.clone(),
            Arc::new(connectivity.clone()),
            bus,
        );

        Harness {
            agent,
            queue,
            replayer,
            connectivity,
            events,
        }
    }

    async fn enqueue(h: &Harness, url: &str, priority: i32) -> i64 {
        h.queue
            .enqueue(
                NewQueuedRequest::new(
                    RequestMethod::Post,
                    url,
                    Some(serde_json::json!({"url": url})),
                )
                .with_priority(priority),
            )
            .await
            .unwrap()
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_replays_in_priority_order() {
        let h = harness(true);
        enqueue(&h, "https://api/low", 1).await;
        enqueue(&h, "https://api/high", 5).await;
        enqueue(&h, "https://api/mid", 3).await;

        let report = h.agent.sync_pending_requests().await.unwrap();

        assert_eq!(
            h.replayer.calls(),
            vec!["https://api/high", "https://api/mid", "https://api/low"]
        );
        assert_eq!(report.replayed, 3);
        assert_eq!(report.remaining, 0);
        assert!(h.queue.records().is_empty());
    }

    #[tokio::test]
    async fn test_equal_priorities_replay_in_enqueue_order() {
        let h = harness(true);
        enqueue(&h, "https://api/first", 2).await;
        enqueue(&h, "https://api/second", 2).await;
        enqueue(&h, "https://api/third", 2).await;

        h.agent.sync_pending_requests().await.unwrap();

        assert_eq!(
            h.replayer.calls(),
            vec!["https://api/first", "https://api/second", "https://api/third"]
        );
    }

    #[tokio::test]
    async fn test_offline_pass_is_a_noop() {
        let h = harness(false);
        enqueue(&h, "https://api/a", 1).await;

        let report = h.agent.sync_pending_requests().await.unwrap();

        assert!(report.skipped_offline);
        assert_eq!(report.replayed, 0);
        assert!(h.replayer.calls().is_empty());
        assert_eq!(h.queue.records().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_replay_stays_queued() {
        let h = harness(true);
        enqueue(&h, "https://api/ok", 5).await;
        let failing = enqueue(&h, "https://api/broken", 3).await;
        enqueue(&h, "https://api/also-ok", 1).await;

        h.replayer.fail(
            "https://api/broken",
            ReplayError::Failed {
                message: "server error 500".to_string(),
            },
        );

        let report = h.agent.sync_pending_requests().await.unwrap();

        assert_eq!(report.replayed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);

        let remaining = h.queue.records();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, failing);
    }

    #[tokio::test]
    async fn test_auth_failure_stops_the_pass() {
        let h = harness(true);
        enqueue(&h, "https://api/denied", 5).await;
        enqueue(&h, "https://api/never-tried", 1).await;

        h.replayer.fail(
            "https://api/denied",
            ReplayError::Unauthorized {
                message: "session expired".to_string(),
            },
        );

        let report = h.agent.sync_pending_requests().await.unwrap();

        assert_eq!(report.auth_failures, 1);
        assert_eq!(report.replayed, 0);
        assert_eq!(report.remaining, 2);
        assert_eq!(h.replayer.calls(), vec!["https://api/denied"]);
        assert_eq!(h.queue.records().len(), 2);
    }

    #[tokio::test]
    async fn test_replayed_events_are_published() {
        let h = harness(true);
        let id = enqueue(&h, "https://api/a", 1).await;

        h.agent.sync_pending_requests().await.unwrap();

        assert_eq!(
            *h.events.lock().unwrap(),
            vec![SessionEvent::RequestReplayed { id }]
        );
    }

    #[tokio::test]
    async fn test_empty_queue_reports_nothing() {
        let h = harness(true);
        let report = h.agent.sync_pending_requests().await.unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn test_run_drains_on_command() {
        let h = harness(true);
        enqueue(&h, "https://api/a", 1).await;

        let (tx, rx) = mpsc::channel(4);
        tx.send(SyncCommand::SyncNow).await.unwrap();
        drop(tx);

        // The loop drains the command then exits on channel close.
        tokio::time::timeout(
            Duration::from_secs(2),
            h.agent.run(rx, Duration::from_secs(60)),
        )
        .await
        .expect("Agent should exit when the command channel closes");

        assert_eq!(h.replayer.calls(), vec!["https://api/a"]);
        assert!(h.queue.records().is_empty());
    }

    #[tokio::test]
    async fn test_run_exits_on_channel_close() {
        let h = harness(true);
        let (tx, rx) = mpsc::channel::<SyncCommand>(1);
        drop(tx);

        tokio::time::timeout(
            Duration::from_secs(2),
            h.agent.run(rx, Duration::from_secs(60)),
        )
        .await
        .expect("Agent should exit when the command channel closes");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_when_connectivity_returns() {
        let h = harness(false);
        enqueue(&h, "https://api/a", 1).await;

        let (tx, rx) = mpsc::channel::<SyncCommand>(1);

        let agent = h.agent;
        let run = tokio::spawn(async move {
            agent.run(rx, Duration::from_millis(100)).await;
        });

        // First ticks happen offline: nothing replays.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(h.replayer.calls().is_empty());

        // Flip online; the next tick drains.
        h.connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(h.replayer.calls(), vec!["https://api/a"]);

        drop(tx);
        run.await.unwrap();
    }
}
