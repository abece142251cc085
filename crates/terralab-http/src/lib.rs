//! TerraLab HTTP - REST backend client
//!
//! Provides the async client for the TerraLab REST API:
//! - Bearer-token attachment from the durable token store
//! - Single-flight token refresh on 401, shared by all concurrent callers
//! - Exponential backoff for network and server errors
//! - Offline queuing of mutating requests for later sync
//! - Response envelope normalization
//!
//! ## Modules
//!
//! - [`client`] - The request pipeline ([`ApiClient`](client::ApiClient))
//! - [`envelope`] - `{success, data, message}` envelope normalization
//! - [`refresh`] - Single-flight refresh coordination
//! - [`retry`] - Backoff policy and retry execution
//! - [`gateway`] - `AuthGateway` port implementation over the client

pub mod client;
pub mod envelope;
pub mod gateway;
pub mod refresh;
pub mod retry;

use thiserror::Error;

/// Errors produced by the request pipeline
///
/// The variants map one-to-one onto the recovery policy: `Network` and
/// `Server` are retried with backoff; `Auth` gets the single
/// 401-triggered refresh; `Validation` is surfaced untouched;
/// `OfflineQueued` is not a failure at all but a deferral the caller can
/// distinguish from one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The server rejected the request's credentials (401)
    #[error("Unauthorized ({status}): {message}")]
    Auth {
        /// HTTP status (401)
        status: u16,
        /// Server-provided reason
        message: String,
        /// Minutes to wait before retrying, when the server rate-limits
        wait_minutes: Option<u32>,
        /// Remaining attempts before lockout, when the server rate-limits
        remaining_attempts: Option<u32>,
    },

    /// No response was received (connection failure or timeout)
    #[error("Network error: {message}")]
    Network {
        /// Transport-level description
        message: String,
        /// True when the per-request timeout elapsed
        timed_out: bool,
    },

    /// The server failed with a 5xx status
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status
        status: u16,
        /// Server-provided reason
        message: String,
    },

    /// The mutating request was persisted for later sync
    ///
    /// "Accepted, deferred" - not a failure. Callers that see this must
    /// not resubmit the work themselves.
    #[error("Request queued for offline sync (id {id})")]
    OfflineQueued {
        /// Id assigned by the request queue
        id: i64,
    },

    /// The server rejected the request with a non-401 4xx status
    #[error("Request rejected ({status}): {message}")]
    Validation {
        /// HTTP status
        status: u16,
        /// Server-provided reason
        message: String,
        /// Rate-limit hint from the response body, if present
        wait_minutes: Option<u32>,
        /// Rate-limit hint from the response body, if present
        remaining_attempts: Option<u32>,
    },

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl HttpError {
    /// Returns true for failures the backoff stage may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, HttpError::Network { .. } | HttpError::Server { .. })
    }

    /// Returns true when the request was deferred rather than failed
    pub fn is_deferred(&self) -> bool {
        matches!(self, HttpError::OfflineQueued { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(HttpError::Network {
            message: "refused".to_string(),
            timed_out: false,
        }
        .is_retryable());
        assert!(HttpError::Server {
            status: 503,
            message: "unavailable".to_string(),
        }
        .is_retryable());

        assert!(!HttpError::Auth {
            status: 401,
            message: "expired".to_string(),
            wait_minutes: None,
            remaining_attempts: None,
        }
        .is_retryable());
        assert!(!HttpError::Validation {
            status: 422,
            message: "bad payload".to_string(),
            wait_minutes: None,
            remaining_attempts: None,
        }
        .is_retryable());
        assert!(!HttpError::OfflineQueued { id: 1 }.is_retryable());
    }

    #[test]
    fn test_deferred_classification() {
        assert!(HttpError::OfflineQueued { id: 1 }.is_deferred());
        assert!(!HttpError::Network {
            message: "x".to_string(),
            timed_out: false,
        }
        .is_deferred());
    }

    #[test]
    fn test_display() {
        let err = HttpError::OfflineQueued { id: 12 };
        assert_eq!(err.to_string(), "Request queued for offline sync (id 12)");

        let err = HttpError::Server {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Server error 500: boom");
    }
}
