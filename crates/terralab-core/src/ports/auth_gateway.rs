//! Auth gateway port (driven/secondary port)
//!
//! This module defines the interface to the backend's authentication
//! endpoints: login, register, refresh, logout, and the profile resource.
//! The HTTP adapter implements it over the shared API client.
//!
//! ## Design Notes
//!
//! - Unlike the storage ports, this port uses a typed [`GatewayError`]:
//!   the session state machine branches on 401 vs transient failure vs
//!   structured rejection, so the classification is domain-level.
//! - DTOs here are port-level; the adapter owns the wire shapes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::UserProfile;

// ============================================================================
// Port-level DTOs
// ============================================================================

/// Credentials and profile granted by a successful login/register/refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGrant {
    /// Bearer token for subsequent requests
    pub access_token: String,
    /// Refresh token, when the backend issues one
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds, when the backend reports one
    pub expires_in_secs: Option<u64>,
    /// Profile of the authenticated user, when the response carries it
    pub profile: Option<UserProfile>,
}

/// Payload for creating a new account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Partial profile update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
}

// ============================================================================
// GatewayError
// ============================================================================

/// Classified failure of an auth gateway call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The server rejected the credentials or the bearer token (401)
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Server-provided reason
        message: String,
    },

    /// A structured rejection (e.g. rate-limited login, validation failure)
    #[error("Rejected ({status}): {message}")]
    Rejected {
        /// HTTP status of the rejection
        status: u16,
        /// Server-provided reason
        message: String,
        /// Minutes to wait before retrying, for rate-limited logins
        wait_minutes: Option<u32>,
        /// Remaining attempts before lockout, for rate-limited logins
        remaining_attempts: Option<u32>,
    },

    /// No response was received (connection error or timeout)
    #[error("Network error: {message}")]
    Network {
        /// Transport-level description
        message: String,
    },

    /// The server failed (5xx) after the client's retry budget
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status
        status: u16,
        /// Server-provided reason
        message: String,
    },

    /// The mutating call was persisted for later sync instead of failing
    #[error("Request queued for offline sync (id {id})")]
    Offline {
        /// Id of the queued record
        id: i64,
    },

    /// Anything else (undecodable response, adapter bug)
    #[error("{message}")]
    Other {
        /// Description of the failure
        message: String,
    },
}

impl GatewayError {
    /// Returns true for 401-classified failures
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized { .. })
    }

    /// Returns true for failures that say nothing about the credentials
    /// (network, server, queued-offline)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Network { .. } | GatewayError::Server { .. } | GatewayError::Offline { .. }
        )
    }
}

// ============================================================================
// AuthGateway trait
// ============================================================================

/// Port trait for the backend's authentication endpoints
#[async_trait::async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchanges credentials for tokens (`POST /auth/login`)
    ///
    /// Never queued offline: an unreachable backend is a
    /// [`GatewayError::Network`], not a deferred login.
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, GatewayError>;

    /// Creates an account and signs it in (`POST /auth/register`)
    async fn register(&self, registration: &Registration) -> Result<AuthGrant, GatewayError>;

    /// Exchanges the refresh token for a fresh grant (`POST /auth/refresh`,
    /// bearer = refresh token)
    ///
    /// Implementations must share the client's single-flight refresh: a
    /// manual refresh and a 401-triggered refresh never run concurrently.
    async fn refresh(&self) -> Result<AuthGrant, GatewayError>;

    /// Notifies the server of logout (`POST /auth/logout`)
    ///
    /// Best-effort by contract: callers clear local state regardless of
    /// the outcome.
    async fn logout(&self) -> Result<(), GatewayError>;

    /// Fetches the authoritative profile (`GET /auth/profile`)
    async fn fetch_profile(&self) -> Result<UserProfile, GatewayError>;

    /// Applies a partial profile update (`PATCH /auth/profile`)
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, GatewayError>;
}
