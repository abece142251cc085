//! TerraLab Store - Durable local persistence
//!
//! SQLite-based store for:
//! - Session tokens, expiry, and the cached user profile
//! - The offline request queue
//!
//! ## Architecture
//!
//! This crate implements the `TokenStore` and `RequestQueue` ports from
//! `terralab-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture. Durability is the
//! point: both stores must survive a full process restart, which is the
//! whole reason the offline queue exists.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteTokenStore`] - `TokenStore` implementation
//! - [`SqliteRequestQueue`] - `RequestQueue` implementation
//! - [`StoreError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use terralab_store::{DatabasePool, SqliteRequestQueue, SqliteTokenStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/terralab/client.db")).await?;
//! let tokens = SqliteTokenStore::new(pool.pool().clone());
//! let queue = SqliteRequestQueue::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod queue;
pub mod token_store;

pub use pool::DatabasePool;
pub use queue::SqliteRequestQueue;
pub use token_store::SqliteTokenStore;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}
