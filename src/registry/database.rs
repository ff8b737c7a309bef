//! Batch Registry Database
//!
//! Stores one row per submitted batch in SQLite:
//! - Which flow and record it belongs to, who signed it, how many calls
//! - Its final status, transaction hash or failure reason

use crate::{BatchKind, RecordId, error::RegistryError};
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::time::Duration;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS batches (
        calls_id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        record_id TEXT NOT NULL,
        from_address TEXT NOT NULL,
        call_count INTEGER NOT NULL,
        status TEXT NOT NULL,
        transaction_hash TEXT,
        error TEXT,
        submitted_at INTEGER NOT NULL,
        finished_at INTEGER
    )";

/// Status stored for a batch that is still being polled
pub const STATUS_SUBMITTED: &str = "SUBMITTED";

/// One row of the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub calls_id: String,
    pub kind: String,
    pub record_id: String,
    pub from_address: String,
    pub call_count: i64,
    pub status: String,
    pub transaction_hash: Option<String>,
    pub error: Option<String>,
    pub submitted_at: i64,
    pub finished_at: Option<i64>,
}

/// Batch registry
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Registry {
    pool: SqlitePool,
}

impl Registry {
    /// Connect to the database at `url` and create the schema if needed
    ///
    /// An in-memory database lives in a single connection that is never
    /// recycled, since every SQLite connection gets its own memory database.
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = options.connect(url).await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Record a freshly submitted batch
    pub async fn record_submitted(
        &self,
        calls_id: &str,
        kind: BatchKind,
        record_id: &RecordId,
        from: &ethers::types::Address,
        call_count: usize,
    ) -> Result<(), RegistryError> {
        sqlx::query(
            "INSERT OR REPLACE INTO batches
                (calls_id, kind, record_id, from_address, call_count, status, submitted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(calls_id)
        .bind(kind.as_str())
        .bind(record_id.to_string())
        .bind(format!("{from:?}"))
        .bind(call_count as i64)
        .bind(STATUS_SUBMITTED)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record how a batch ended
    pub async fn record_outcome(
        &self,
        calls_id: &str,
        status: &str,
        transaction_hash: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), RegistryError> {
        sqlx::query(
            "UPDATE batches
             SET status = ?, transaction_hash = ?, error = ?, finished_at = ?
             WHERE calls_id = ?",
        )
        .bind(status)
        .bind(transaction_hash)
        .bind(error)
        .bind(chrono::Utc::now().timestamp())
        .bind(calls_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, calls_id: &str) -> Result<Option<BatchRecord>, RegistryError> {
        let row = sqlx::query("SELECT * FROM batches WHERE calls_id = ?")
            .bind(calls_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(BatchRecord {
            calls_id: row.try_get("calls_id")?,
            kind: row.try_get("kind")?,
            record_id: row.try_get("record_id")?,
            from_address: row.try_get("from_address")?,
            call_count: row.try_get("call_count")?,
            status: row.try_get("status")?,
            transaction_hash: row.try_get("transaction_hash")?,
            error: row.try_get("error")?,
            submitted_at: row.try_get("submitted_at")?,
            finished_at: row.try_get("finished_at")?,
        }))
    }
}
