//! Request queue port (driven/secondary port)
//!
//! Durable, ordered store of mutating requests that failed for lack of
//! connectivity. The entire point of this port is surviving a process
//! restart while offline: an in-memory implementation would defeat it
//! (tests may still use one for orchestration-only assertions).

use crate::domain::{NewQueuedRequest, QueuedRequest};

/// Port trait for the durable offline request queue
///
/// Records are append-only: deletion via [`remove`](RequestQueue::remove)
/// is the only way a record leaves the queue, and ids are never reused
/// for the life of the store.
#[async_trait::async_trait]
pub trait RequestQueue: Send + Sync {
    /// Persists a new record and returns its store-assigned id
    async fn enqueue(&self, request: NewQueuedRequest) -> anyhow::Result<i64>;

    /// Returns all records in insertion (id) order
    ///
    /// Consumers apply priority ordering themselves; see the sync agent.
    async fn list_all(&self) -> anyhow::Result<Vec<QueuedRequest>>;

    /// Removes a record by id
    ///
    /// Idempotent: removing an absent id is a no-op, not an error.
    async fn remove(&self, id: i64) -> anyhow::Result<()>;
}
