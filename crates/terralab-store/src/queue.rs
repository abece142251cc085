//! SQLite implementation of the RequestQueue port
//!
//! Queued requests are append-only rows; SQLite's AUTOINCREMENT keeps
//! ids unique and monotonic for the life of the database, so an id seen
//! once is never reused even after deletion. Bodies and headers are
//! stored as JSON text.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use terralab_core::domain::{NewQueuedRequest, QueuedRequest, RequestMethod};
use terralab_core::ports::RequestQueue;

use crate::StoreError;

/// SQLite-backed implementation of the offline request queue
pub struct SqliteRequestQueue {
    pool: SqlitePool,
}

impl SqliteRequestQueue {
    /// Creates a queue over the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Reconstruct a QueuedRequest from a database row
fn request_from_row(row: &SqliteRow) -> Result<QueuedRequest, StoreError> {
    let id: i64 = row.get("id");
    let method_str: String = row.get("method");
    let url: String = row.get("url");
    let body_str: Option<String> = row.get("body");
    let headers_str: String = row.get("headers");
    let priority: i64 = row.get("priority");
    let enqueued_at_str: String = row.get("enqueued_at");

    let method = RequestMethod::from_str(&method_str).map_err(|e| {
        StoreError::SerializationError(format!("Invalid method in row {}: {}", id, e))
    })?;

    let body = match body_str {
        Some(ref s) if !s.is_empty() => Some(serde_json::from_str(s).map_err(|e| {
            StoreError::SerializationError(format!("Invalid body JSON in row {}: {}", id, e))
        })?),
        _ => None,
    };

    // Headers are advisory; a corrupt value degrades to empty rather
    // than poisoning the whole queue listing.
    let headers: HashMap<String, String> = serde_json::from_str(&headers_str).unwrap_or_else(|e| {
        warn!(id, error = %e, "Invalid headers JSON in queued request; ignoring headers");
        HashMap::new()
    });

    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::SerializationError(format!(
                "Invalid enqueued_at '{}' in row {}: {}",
                enqueued_at_str, id, e
            ))
        })?;

    Ok(QueuedRequest {
        id,
        method,
        url,
        body,
        headers,
        enqueued_at,
        priority: priority as i32,
    })
}

#[async_trait::async_trait]
impl RequestQueue for SqliteRequestQueue {
    async fn enqueue(&self, request: NewQueuedRequest) -> anyhow::Result<i64> {
        let body = request
            .body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let headers = serde_json::to_string(&request.headers)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO queued_requests (method, url, body, headers, priority, enqueued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(request.method.as_str())
        .bind(&request.url)
        .bind(body)
        .bind(headers)
        .bind(request.priority)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)
        .context("Failed to enqueue request")?;

        let id = result.last_insert_rowid();
        debug!(id, method = %request.method, url = %request.url, "Queued request for offline sync");
        Ok(id)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<QueuedRequest>> {
        let rows = sqlx::query(
            "SELECT id, method, url, body, headers, priority, enqueued_at
             FROM queued_requests ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)
        .context("Failed to list queued requests")?;

        rows.iter()
            .map(|row| request_from_row(row).map_err(Into::into))
            .collect()
    }

    async fn remove(&self, id: i64) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM queued_requests WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)
            .context("Failed to remove queued request")?;

        if result.rows_affected() == 0 {
            // Absent id: removal is idempotent by contract.
            debug!(id, "Remove called for absent queued request");
        } else {
            debug!(id, "Removed queued request");
        }

        Ok(())
    }
}
