//! Token store port (driven/secondary port)
//!
//! Durable key/value storage for the session's bearer credentials and the
//! cached user profile. The store must persist every write before
//! returning: a token recorded here survives a full process restart.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - `user_data()` is deliberately lossy: an unparseable cached profile
//!   reads as `None`, never an error. A corrupt cache must not take the
//!   session down.
//! - `clear_tokens()` is atomic from the caller's point of view: no
//!   partially-cleared state is ever observable.

use crate::domain::UserProfile;

/// Port trait for durable token and profile storage
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Stores the access token, optional refresh token, and optional expiry
    ///
    /// When `expires_in_secs` is given the store records an absolute
    /// expiry of `now + expires_in_secs`; when absent, any previously
    /// recorded expiry is removed and the token is treated as
    /// non-expiring. A `None` refresh token keeps the previously stored
    /// one (refresh responses may omit it without revoking it). The
    /// write is durable before this method returns.
    async fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: Option<u64>,
    ) -> anyhow::Result<()>;

    /// Returns the stored access token, if any
    async fn access_token(&self) -> anyhow::Result<Option<String>>;

    /// Returns the stored refresh token, if any
    async fn refresh_token(&self) -> anyhow::Result<Option<String>>;

    /// Returns true if a recorded expiry has passed
    ///
    /// Returns `false` when no expiry was ever recorded (non-expiring).
    async fn is_token_expired(&self) -> anyhow::Result<bool>;

    /// Returns true if an access token is present and not expired
    async fn has_valid_token(&self) -> anyhow::Result<bool>;

    /// Caches the user profile, overwriting any previous value
    async fn set_user_data(&self, profile: &UserProfile) -> anyhow::Result<()>;

    /// Returns the cached user profile
    ///
    /// Returns `None` when nothing is cached or the cached value fails to
    /// parse.
    async fn user_data(&self) -> anyhow::Result<Option<UserProfile>>;

    /// Removes access token, refresh token, expiry, and cached profile
    ///
    /// Atomic from the caller's point of view. Clearing an already-empty
    /// store is a no-op.
    async fn clear_tokens(&self) -> anyhow::Result<()>;
}
