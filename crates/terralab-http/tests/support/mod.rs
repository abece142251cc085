//! Shared fakes and harness for the HTTP integration tests
//!
//! In-memory implementations of the storage ports keep these tests
//! focused on wire behavior; the durable adapters have their own suite
//! in `terralab-store`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use terralab_core::config::ClientConfig;
use terralab_core::domain::{NewQueuedRequest, QueuedRequest, UserProfile};
use terralab_core::events::{SessionEvent, SessionEvents};
use terralab_core::ports::{RequestQueue, SharedConnectivity, TokenStore};
use terralab_http::client::ApiClient;

// ============================================================================
// MemoryTokenStore
// ============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: Option<u64>,
    ) -> anyhow::Result<()> {
        let mut values = self.values.lock().unwrap();
        values.insert("access_token".to_string(), access_token.to_string());
        if let Some(refresh) = refresh_token {
            values.insert("refresh_token".to_string(), refresh.to_string());
        }
        match expires_in_secs {
            Some(secs) => values.insert("token_expiry".to_string(), secs.to_string()),
            None => values.remove("token_expiry"),
        };
        Ok(())
    }

    async fn access_token(&self) -> anyhow::Result<Option<String>> {
        Ok(self.get("access_token"))
    }

    async fn refresh_token(&self) -> anyhow::Result<Option<String>> {
        Ok(self.get("refresh_token"))
    }

    async fn is_token_expired(&self) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn has_valid_token(&self) -> anyhow::Result<bool> {
        Ok(self.get("access_token").is_some())
    }

    async fn set_user_data(&self, profile: &UserProfile) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert("user_data".to_string(), serde_json::to_string(profile)?);
        Ok(())
    }

    async fn user_data(&self) -> anyhow::Result<Option<UserProfile>> {
        Ok(self
            .get("user_data")
            .and_then(|json| serde_json::from_str(&json).ok()))
    }

    async fn clear_tokens(&self) -> anyhow::Result<()> {
        self.values.lock().unwrap().clear();
        Ok(())
    }
}

// ============================================================================
// MemoryQueue
// ============================================================================

#[derive(Default)]
pub struct MemoryQueue {
    next_id: AtomicI64,
    records: Mutex<Vec<QueuedRequest>>,
}

impl MemoryQueue {
    pub fn records(&self) -> Vec<QueuedRequest> {
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

// ============================================================================
// RecordingEvents
// ============================================================================

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, wanted: &SessionEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == wanted)
            .count()
    }
}

impl SessionEvents for RecordingEvents {
    fn publish(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestContext {
    pub client: Arc<ApiClient>,
    pub tokens: Arc<MemoryTokenStore>,
    pub queue: Arc<MemoryQueue>,
    pub connectivity: SharedConnectivity,
    pub events: Arc<RecordingEvents>,
}

/// Client configuration with a millisecond backoff schedule
pub fn fast_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.api.base_url = base_url.to_string();
    config.api.timeout_secs = 5;
    config.retry.initial_delay_ms = 10;
    config
}

/// Builds a client over in-memory ports
pub fn build_client(base_url: &str, online: bool) -> TestContext {
    let tokens = Arc::new(MemoryTokenStore::default());
    let queue = Arc::new(MemoryQueue::default());
    let connectivity = SharedConnectivity::new(online);
    let events = Arc::new(RecordingEvents::default());

    let client = ApiClient::new(
        &fast_config(base_url),
        tokens.clone(),
        queue.clone(),
        Arc::new(connectivity.clone()),
        events.clone(),
    )
    .expect("Failed to build test client");

    TestContext {
        client: Arc::new(client),
        tokens,
        queue,
        connectivity,
        events,
    }
}
