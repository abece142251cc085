//! Request replayer port (driven/secondary port)
//!
//! The sync agent replays queued requests but must not depend on the HTTP
//! adapter crate, so replay is inverted behind this port. The HTTP client
//! implements it with its normal pipeline minus the offline-queue stage
//! (a replay that fails offline must never re-enqueue itself).

use thiserror::Error;

use crate::domain::QueuedRequest;

/// Classified failure of a replay attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The server rejected the replay with 401 (after the client's own
    /// refresh handling); the session layer decides what to do about it
    #[error("Replay unauthorized: {message}")]
    Unauthorized {
        /// Server-provided reason
        message: String,
    },

    /// Any other failure; the record stays queued for the next pass
    #[error("Replay failed: {message}")]
    Failed {
        /// Description of the failure
        message: String,
    },
}

/// Port trait for replaying a queued request against the backend
#[async_trait::async_trait]
pub trait RequestReplayer: Send + Sync {
    /// Replays the record's original method/url/body/headers
    ///
    /// Authorization is re-attached from the current token store; a
    /// stale bearer captured at enqueue time is never replayed.
    async fn replay(&self, request: &QueuedRequest) -> Result<(), ReplayError>;
}
