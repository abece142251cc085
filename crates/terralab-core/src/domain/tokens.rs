//! Token record domain entity
//!
//! Represents the bearer credentials of an authenticated session. The
//! access token is the short-lived credential attached to requests; the
//! optional refresh token is exchanged for a new access token when the
//! access token expires or is rejected.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bearer credentials for an authenticated session
///
/// An absent access token means the session is unauthenticated regardless
/// of any cached profile. `expires_at` is `None` when the server never
/// reported a lifetime; such tokens are treated as non-expiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for obtaining a new access token without user interaction
    pub refresh_token: Option<String>,
    /// When the access token expires (None = no recorded expiry)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Tokens {
    /// Creates a token record from an access token and an optional
    /// `expires_in` lifetime in seconds, anchored at `now`
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<u64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(|secs| now + Duration::seconds(secs as i64)),
        }
    }

    /// Returns true if the access token has expired as of `now`
    ///
    /// A token without a recorded expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Returns true if the token is present and not expired as of `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(now)
    }

    /// Returns true if the access token will expire within `duration` of `now`
    pub fn expires_within(&self, now: DateTime<Utc>, duration: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + duration >= expires_at,
            None => false,
        }
    }
}
