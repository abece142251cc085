//! SQLite implementation of the TokenStore port
//!
//! Tokens, expiry, and the cached profile live as key/value rows in the
//! `auth_store` table:
//!
//! | Key             | Value                                   |
//! |-----------------|-----------------------------------------|
//! | `access_token`  | bearer token                            |
//! | `refresh_token` | refresh token                           |
//! | `token_expiry`  | absolute expiry, RFC 3339               |
//! | `user_data`     | cached [`UserProfile`] as JSON          |
//!
//! Every write is committed before the call returns; `clear_tokens`
//! deletes all four rows in one transaction so no partially-cleared
//! state is observable.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use terralab_core::domain::UserProfile;
use terralab_core::ports::{Clock, SystemClock, TokenStore};

use crate::StoreError;

const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_TOKEN_EXPIRY: &str = "token_expiry";
const KEY_USER_DATA: &str = "user_data";

/// SQLite-backed implementation of the token store port
pub struct SqliteTokenStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTokenStore {
    /// Creates a store over the given pool, using the system clock
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a store with an injected clock (tests fast-forward it)
    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Reads a value from the key/value table
    async fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM auth_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    /// Writes a value into the key/value table (upsert)
    async fn put_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO auth_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads the recorded expiry, tolerating a corrupt value
    ///
    /// A value that fails to parse reads as "no expiry recorded": a
    /// corrupt row must not lock the user out of a non-expiring session.
    async fn expiry(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(raw) = self.get_value(KEY_TOKEN_EXPIRY).await? else {
            return Ok(None);
        };

        match DateTime::parse_from_rfc3339(&raw) {
            Ok(dt) => Ok(Some(dt.with_timezone(&Utc))),
            Err(e) => {
                warn!(error = %e, "Stored token expiry is unparseable; treating as non-expiring");
                Ok(None)
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenStore for SqliteTokenStore {
    async fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: Option<u64>,
    ) -> anyhow::Result<()> {
        self.put_value(KEY_ACCESS_TOKEN, access_token)
            .await
            .context("Failed to store access token")?;

        // Refresh responses may omit the refresh token without revoking
        // it; only overwrite when a new one arrives.
        if let Some(refresh) = refresh_token {
            self.put_value(KEY_REFRESH_TOKEN, refresh)
                .await
                .context("Failed to store refresh token")?;
        }

        match expires_in_secs {
            Some(secs) => {
                let expires_at = self.clock.now() + Duration::seconds(secs as i64);
                self.put_value(KEY_TOKEN_EXPIRY, &expires_at.to_rfc3339())
                    .await
                    .context("Failed to store token expiry")?;
            }
            None => {
                // No lifetime reported: drop any stale expiry so the new
                // token is not judged by the old token's deadline.
                sqlx::query("DELETE FROM auth_store WHERE key = ?1")
                    .bind(KEY_TOKEN_EXPIRY)
                    .execute(&self.pool)
                    .await
                    .map_err(StoreError::from)
                    .context("Failed to clear token expiry")?;
            }
        }

        debug!("Stored session tokens");
        Ok(())
    }

    async fn access_token(&self) -> anyhow::Result<Option<String>> {
        Ok(self.get_value(KEY_ACCESS_TOKEN).await?)
    }

    async fn refresh_token(&self) -> anyhow::Result<Option<String>> {
        Ok(self.get_value(KEY_REFRESH_TOKEN).await?)
    }

    async fn is_token_expired(&self) -> anyhow::Result<bool> {
        match self.expiry().await? {
            Some(expires_at) => Ok(self.clock.now() > expires_at),
            None => Ok(false),
        }
    }

    async fn has_valid_token(&self) -> anyhow::Result<bool> {
        let present = self.access_token().await?.is_some();
        Ok(present && !self.is_token_expired().await?)
    }

    async fn set_user_data(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let json = serde_json::to_string(profile)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.put_value(KEY_USER_DATA, &json)
            .await
            .context("Failed to cache user profile")?;
        Ok(())
    }

    async fn user_data(&self) -> anyhow::Result<Option<UserProfile>> {
        let Some(json) = self.get_value(KEY_USER_DATA).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(error = %e, "Cached profile is unparseable; returning none");
                Ok(None)
            }
        }
    }

    async fn clear_tokens(&self) -> anyhow::Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::from)
            .context("Failed to begin clear transaction")?;

        sqlx::query("DELETE FROM auth_store WHERE key IN (?1, ?2, ?3, ?4)")
            .bind(KEY_ACCESS_TOKEN)
            .bind(KEY_REFRESH_TOKEN)
            .bind(KEY_TOKEN_EXPIRY)
            .bind(KEY_USER_DATA)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)
            .context("Failed to clear session rows")?;

        tx.commit()
            .await
            .map_err(StoreError::from)
            .context("Failed to commit clear transaction")?;

        debug!("Cleared session tokens and cached profile");
        Ok(())
    }
}
