//! TerraLab API client
//!
//! Wraps `reqwest::Client` with the stages every request flows through:
//!
//! ```text
//! auth-attach -> send -> classify -+-> 2xx: envelope -> caller
//!                                  +-> 401: single-flight refresh, replay once
//!                                  +-> network/5xx: backoff (1s, 2s), retry
//!                                  +-> offline + mutating: persist to queue
//!                                  +-> other 4xx: surface untouched
//! ```
//!
//! Each stage is its own unit (the backoff executor in [`retry`](crate::retry),
//! the single-flight slot in [`refresh`](crate::refresh), the offline gate
//! here) so they can be tested independently and composed explicitly -
//! there is no hidden interceptor mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use terralab_core::config::ClientConfig;
use terralab_core::domain::{NewQueuedRequest, QueuedRequest, RequestMethod, DEFAULT_PRIORITY};
use terralab_core::events::{SessionEvent, SessionEvents};
use terralab_core::ports::{
    AuthGrant, Connectivity, ReplayError, RequestQueue, RequestReplayer, TokenStore,
};

use crate::envelope::{self, Envelope};
use crate::gateway::grant_from_value;
use crate::refresh::{RefreshCoordinator, RefreshFailure, RefreshOutcome};
use crate::retry::{run_with_backoff, BackoffPolicy};
use crate::HttpError;

// ============================================================================
// ApiRequest
// ============================================================================

/// A request entering the pipeline
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: RequestMethod,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    /// JSON body, if any
    pub body: Option<Value>,
    /// Extra headers (authorization is managed by the pipeline)
    pub headers: HashMap<String, String>,
    /// Priority used if the request ends up in the offline queue
    pub priority: i32,
    /// Whether a mutating request may be queued when offline
    pub queue_offline: bool,
    /// Whether a 401 triggers the coordinated refresh-and-replay
    pub refresh_on_401: bool,
}

impl ApiRequest {
    /// Creates a request with pipeline defaults
    pub fn new(method: RequestMethod, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            headers: HashMap::new(),
            priority: DEFAULT_PRIORITY,
            queue_offline: true,
            refresh_on_401: true,
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(RequestMethod::Get, path, None)
    }

    /// POST request with a JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(RequestMethod::Post, path, Some(body))
    }

    /// PUT request with a JSON body
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(RequestMethod::Put, path, Some(body))
    }

    /// PATCH request with a JSON body
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(RequestMethod::Patch, path, Some(body))
    }

    /// DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(RequestMethod::Delete, path, None)
    }

    /// Adds a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the offline-queue priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Marks this as an auth endpoint call
    ///
    /// Auth endpoints are never queued offline (a deferred login makes
    /// no sense) and never trigger the 401 refresh recovery (a 401 from
    /// login *is* the answer, not a stale-token symptom).
    pub fn auth_endpoint(mut self) -> Self {
        self.queue_offline = false;
        self.refresh_on_401 = false;
        self
    }
}

// ============================================================================
// ApiClient
// ============================================================================

/// HTTP client for the TerraLab REST backend
pub struct ApiClient {
    /// The underlying HTTP client (carries the per-request timeout)
    http: Client,
    /// Base URL for relative request paths
    base_url: String,
    /// Path of the token refresh endpoint
    refresh_path: String,
    tokens: Arc<dyn TokenStore>,
    queue: Arc<dyn RequestQueue>,
    connectivity: Arc<dyn Connectivity>,
    events: Arc<dyn SessionEvents>,
    refresh: RefreshCoordinator,
    backoff: BackoffPolicy,
}

impl ApiClient {
    /// Creates a client from the given configuration and ports
    pub fn new(
        config: &ClientConfig,
        tokens: Arc<dyn TokenStore>,
        queue: Arc<dyn RequestQueue>,
        connectivity: Arc<dyn Connectivity>,
        events: Arc<dyn SessionEvents>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            refresh_path: config.api.refresh_path.clone(),
            tokens,
            queue,
            connectivity,
            events,
            refresh: RefreshCoordinator::new(),
            backoff: BackoffPolicy::from_config(&config.retry),
        })
    }

    /// Overrides the base URL (useful for tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the backoff policy (tests use millisecond schedules)
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the configured base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Typed convenience surface
    // ========================================================================

    /// GET, normalized to an envelope
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, HttpError> {
        self.request(ApiRequest::get(path)).await
    }

    /// POST, normalized to an envelope
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<Envelope<T>, HttpError> {
        self.request(ApiRequest::post(path, body)).await
    }

    /// PUT, normalized to an envelope
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<Envelope<T>, HttpError> {
        self.request(ApiRequest::put(path, body)).await
    }

    /// PATCH, normalized to an envelope
    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<Envelope<T>, HttpError> {
        self.request(ApiRequest::patch(path, body)).await
    }

    /// DELETE, normalized to an envelope
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, HttpError> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Runs a request through the full pipeline
    pub async fn request<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Envelope<T>, HttpError> {
        let value = self.execute(&request).await?;
        envelope::from_value(value)
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Runs the send, refresh, and offline stages
    async fn execute(&self, request: &ApiRequest) -> Result<Value, HttpError> {
        let first = self.send_stage(request, None).await;

        let outcome = match first {
            Err(HttpError::Auth { .. }) if request.refresh_on_401 => {
                debug!(path = %request.path, "Request returned 401; entering refresh stage");
                let grant = self.refresh_session().await?;
                // Replay exactly once with the fresh token; a second 401
                // surfaces as-is.
                self.send_stage(request, Some(&grant.access_token)).await
            }
            other => other,
        };

        match outcome {
            Ok(value) => Ok(value),
            Err(err) => self.offline_stage(request, err).await,
        }
    }

    /// Send with backoff for transient failures
    async fn send_stage(
        &self,
        request: &ApiRequest,
        token_override: Option<&str>,
    ) -> Result<Value, HttpError> {
        run_with_backoff(
            &self.backoff,
            || self.attempt(request, token_override),
            // Sleeping through the schedule is pointless once the host
            // reports itself offline; fall through to the queue decision.
            |err| matches!(err, HttpError::Network { .. }) && !self.connectivity.is_online(),
        )
        .await
    }

    /// One wire attempt: attach bearer, send, classify
    async fn attempt(
        &self,
        request: &ApiRequest,
        token_override: Option<&str>,
    ) -> Result<Value, HttpError> {
        let url = self.url_for(&request.path);
        let mut builder = self.http.request(to_http_method(request.method), &url);

        match token_override {
            Some(token) => builder = builder.bearer_auth(token),
            None => {
                if let Some(token) = self.bearer_token().await {
                    builder = builder.bearer_auth(token);
                }
            }
        }

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| HttpError::Network {
            message: e.to_string(),
            timed_out: e.is_timeout(),
        })?;

        let status = response.status();
        let value = read_body(response).await?;
        classify(status, value)
    }

    /// Queue-on-offline stage
    ///
    /// A mutating request that died of a pure network failure while the
    /// host reports offline is persisted and answered with the
    /// distinguishable [`HttpError::OfflineQueued`]. Everything else
    /// surfaces unchanged.
    async fn offline_stage(&self, request: &ApiRequest, err: HttpError) -> Result<Value, HttpError> {
        let queueable = request.queue_offline
            && request.method.is_mutating()
            && matches!(err, HttpError::Network { .. })
            && !self.connectivity.is_online();

        if !queueable {
            return Err(err);
        }

        let record = NewQueuedRequest {
            method: request.method,
            url: self.url_for(&request.path),
            body: request.body.clone(),
            headers: request.headers.clone(),
            priority: request.priority,
        };

        match self.queue.enqueue(record).await {
            Ok(id) => {
                info!(
                    id,
                    method = %request.method,
                    path = %request.path,
                    "Offline; request queued for later sync"
                );
                self.events.publish(SessionEvent::RequestQueued { id });
                Err(HttpError::OfflineQueued { id })
            }
            Err(queue_err) => {
                warn!(
                    error = %queue_err,
                    "Failed to persist offline request; surfacing original error"
                );
                Err(err)
            }
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Refreshes the session tokens, single-flight
    ///
    /// Concurrent callers share one refresh call and one outcome. On
    /// success the new tokens are already persisted when this returns;
    /// on failure local credentials are cleared and a `SessionExpired`
    /// event has been published.
    pub async fn refresh_session(&self) -> Result<AuthGrant, HttpError> {
        self.refresh
            .run(|| self.perform_refresh())
            .await
            .map_err(|failure| HttpError::Auth {
                status: failure.status.unwrap_or(401),
                message: failure.message,
                wait_minutes: None,
                remaining_attempts: None,
            })
    }

    /// The refresh flight body; runs at most once per coordinated flight
    async fn perform_refresh(&self) -> RefreshOutcome {
        let refresh_token = match self.tokens.refresh_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No refresh token available; expiring session");
                self.expire_session().await;
                return Err(RefreshFailure {
                    status: Some(401),
                    message: "No refresh token available".to_string(),
                });
            }
            Err(err) => {
                return Err(RefreshFailure {
                    status: None,
                    message: format!("Token store read failed: {}", err),
                });
            }
        };

        match self.call_refresh_endpoint(&refresh_token).await {
            Ok(grant) => {
                if let Err(err) = self
                    .tokens
                    .set_tokens(
                        &grant.access_token,
                        grant.refresh_token.as_deref(),
                        grant.expires_in_secs,
                    )
                    .await
                {
                    return Err(RefreshFailure {
                        status: None,
                        message: format!("Failed to persist refreshed tokens: {}", err),
                    });
                }

                if let Some(ref profile) = grant.profile {
                    if let Err(err) = self.tokens.set_user_data(profile).await {
                        warn!(error = %err, "Failed to cache profile from refresh response");
                    }
                }

                info!("Access token refreshed");
                self.events.publish(SessionEvent::TokenRefreshed);
                Ok(grant)
            }
            Err(failure) => {
                warn!(status = ?failure.status, message = %failure.message, "Token refresh failed");
                self.expire_session().await;
                Err(failure)
            }
        }
    }

    /// Calls the refresh endpoint with the refresh token as bearer
    async fn call_refresh_endpoint(&self, refresh_token: &str) -> Result<AuthGrant, RefreshFailure> {
        let url = self.url_for(&self.refresh_path);
        debug!("Calling token refresh endpoint");

        let response = self
            .http
            .post(&url)
            .bearer_auth(refresh_token)
            .send()
            .await
            .map_err(|e| RefreshFailure {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        let value = read_body(response).await.map_err(|e| RefreshFailure {
            status: None,
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let details = envelope::error_details(&value);
            return Err(RefreshFailure {
                status: Some(status.as_u16()),
                message: details
                    .message
                    .unwrap_or_else(|| "Token refresh rejected".to_string()),
            });
        }

        grant_from_value(value).map_err(|e| RefreshFailure {
            status: None,
            message: e.to_string(),
        })
    }

    /// Clears local credentials and announces the expiry
    async fn expire_session(&self) {
        if let Err(err) = self.tokens.clear_tokens().await {
            warn!(error = %err, "Failed to clear tokens while expiring session");
        }
        self.events.publish(SessionEvent::SessionExpired);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Resolves a path against the base URL; absolute URLs pass through
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Reads the current bearer token, if a valid one is stored
    async fn bearer_token(&self) -> Option<String> {
        match self.tokens.has_valid_token().await {
            Ok(true) => match self.tokens.access_token().await {
                Ok(token) => token,
                Err(err) => {
                    warn!(error = %err, "Token store read failed; sending unauthenticated");
                    None
                }
            },
            Ok(false) => None,
            Err(err) => {
                warn!(error = %err, "Token store read failed; sending unauthenticated");
                None
            }
        }
    }
}

// ============================================================================
// RequestReplayer
// ============================================================================

#[async_trait::async_trait]
impl RequestReplayer for ApiClient {
    async fn replay(&self, request: &QueuedRequest) -> Result<(), ReplayError> {
        let api_request = ApiRequest {
            method: request.method,
            path: request.url.clone(),
            body: request.body.clone(),
            headers: request.headers.clone(),
            priority: request.priority,
            // A replay that fails offline must not re-enqueue itself;
            // the record is still in the queue.
            queue_offline: false,
            refresh_on_401: true,
        };

        match self.execute(&api_request).await {
            Ok(_) => Ok(()),
            Err(HttpError::Auth { message, .. }) => Err(ReplayError::Unauthorized { message }),
            Err(err) => Err(ReplayError::Failed {
                message: err.to_string(),
            }),
        }
    }
}

// ============================================================================
// Free functions
// ============================================================================

/// Maps the domain method onto reqwest's
fn to_http_method(method: RequestMethod) -> Method {
    match method {
        RequestMethod::Get => Method::GET,
        RequestMethod::Post => Method::POST,
        RequestMethod::Put => Method::PUT,
        RequestMethod::Patch => Method::PATCH,
        RequestMethod::Delete => Method::DELETE,
    }
}

/// Reads a response body as JSON, tolerating empty and non-JSON bodies
async fn read_body(response: reqwest::Response) -> Result<Value, HttpError> {
    let text = response.text().await.map_err(|e| HttpError::Network {
        message: format!("Failed to read response body: {}", e),
        timed_out: e.is_timeout(),
    })?;

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// Maps a status and body onto the pipeline's error taxonomy
fn classify(status: StatusCode, value: Value) -> Result<Value, HttpError> {
    if status.is_success() {
        return Ok(value);
    }

    let details = envelope::error_details(&value);
    let message = details.message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    });

    if status == StatusCode::UNAUTHORIZED {
        return Err(HttpError::Auth {
            status: status.as_u16(),
            message,
            wait_minutes: details.wait_minutes,
            remaining_attempts: details.remaining_attempts,
        });
    }

    if status.is_server_error() {
        return Err(HttpError::Server {
            status: status.as_u16(),
            message,
        });
    }

    Err(HttpError::Validation {
        status: status.as_u16(),
        message,
        wait_minutes: details.wait_minutes,
        remaining_attempts: details.remaining_attempts,
    })
}
