//! Queued request domain entity
//!
//! A mutating request that failed for lack of connectivity is persisted as
//! a [`QueuedRequest`] and replayed later by the sync agent. Ids are
//! assigned by the durable store, are unique and stable for the life of
//! the record, and deletion is the only way a record leaves the queue.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Default priority assigned to requests queued by the offline gate
pub const DEFAULT_PRIORITY: i32 = 1;

/// HTTP method of a core request
///
/// Only the methods the client issues are represented. Mutating methods
/// are eligible for offline queuing; reads never are (replaying a stale
/// GET is meaningless, replaying a write preserves user intent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl RequestMethod {
    /// Returns true for methods that change server state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, RequestMethod::Get)
    }

    /// Canonical uppercase wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(RequestMethod::Get),
            "POST" => Ok(RequestMethod::Post),
            "PUT" => Ok(RequestMethod::Put),
            "PATCH" => Ok(RequestMethod::Patch),
            "DELETE" => Ok(RequestMethod::Delete),
            other => Err(DomainError::InvalidMethod(other.to_string())),
        }
    }
}

/// A request accepted for deferred replay, not yet persisted
///
/// The durable store assigns the id and the enqueue timestamp when the
/// record is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQueuedRequest {
    /// HTTP method of the original request
    pub method: RequestMethod,
    /// Absolute URL the request was sent to
    pub url: String,
    /// JSON body of the original request, if any
    pub body: Option<serde_json::Value>,
    /// Caller-supplied headers (authorization is re-attached at replay time)
    pub headers: HashMap<String, String>,
    /// Replay priority; higher replays first
    pub priority: i32,
}

impl NewQueuedRequest {
    /// Creates a record with the default priority and no extra headers
    pub fn new(method: RequestMethod, url: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method,
            url: url.into(),
            body,
            headers: HashMap::new(),
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Sets the replay priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a caller-supplied header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A persisted queued request as read back from the durable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Store-assigned id, unique and stable for the life of the record
    pub id: i64,
    /// HTTP method of the original request
    pub method: RequestMethod,
    /// Absolute URL the request was sent to
    pub url: String,
    /// JSON body of the original request, if any
    pub body: Option<serde_json::Value>,
    /// Caller-supplied headers captured at enqueue time
    pub headers: HashMap<String, String>,
    /// When the record was enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Replay priority; higher replays first
    pub priority: i32,
}
