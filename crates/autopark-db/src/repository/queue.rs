//! # Offline Queue Repository
//!
//! Durable FIFO queue of mutations awaiting remote application.
//!
//! ## The Queue Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    offline_queue Table                                  │
//! │                                                                         │
//! │  id | op_kind         | payload   | attempts | synced_at               │
//! │  ───┼─────────────────┼───────────┼──────────┼───────────              │
//! │  a1 │ register_entry  │ {...}     │ 0        │ NULL                    │
//! │  b2 │ process_exit    │ {...}     │ 1        │ NULL                    │
//! │  c3 │ set_setting     │ {...}     │ 0        │ NULL                    │
//! │                                                                         │
//! │  • Appended when the remote store is unreachable                       │
//! │  • Drained FIFO on created_at, one entry at a time                     │
//! │  • Marked synced only after successful remote application              │
//! │  • The envelope id is the idempotency key the remote dedupes on        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use autopark_core::{QueuedOp, QueuedOperation};

/// Repository for offline queue operations.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

/// Raw row shape; payload JSON decodes into [`QueuedOp`] on the way out.
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    synced_at: Option<DateTime<Utc>>,
}

impl QueueRow {
    fn into_operation(self) -> DbResult<QueuedOperation> {
        let op: QueuedOp = serde_json::from_str(&self.payload)?;
        Ok(QueuedOperation {
            id: self.id,
            op,
            attempts: self.attempts,
            last_error: self.last_error,
            created_at: self.created_at,
            attempted_at: self.attempted_at,
            synced_at: self.synced_at,
        })
    }
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueueRepository { pool }
    }

    /// Appends an operation to the queue.
    ///
    /// ## Returns
    /// The stored envelope, including the generated idempotency key.
    pub async fn enqueue(&self, op: &QueuedOp) -> DbResult<QueuedOperation> {
        let entry = QueuedOperation {
            id: Uuid::new_v4().to_string(),
            op: op.clone(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            synced_at: None,
        };

        debug!(id = %entry.id, kind = %op.kind(), "Queuing operation");

        let payload = serde_json::to_string(&entry.op)?;
        sqlx::query(
            r#"
            INSERT INTO offline_queue (
                id, op_kind, payload, attempts, last_error,
                created_at, attempted_at, synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.op.kind())
        .bind(payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Gets pending entries in FIFO order (oldest first).
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<QueuedOperation>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT id, payload, attempts, last_error, created_at, attempted_at, synced_at
            FROM offline_queue
            WHERE synced_at IS NULL
            ORDER BY created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueRow::into_operation).collect()
    }

    /// Marks an entry as successfully applied remotely.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE offline_queue SET
                synced_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed replay attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE offline_queue SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts pending entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM offline_queue WHERE synced_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes old synced entries (cleanup).
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_synced(&self, days_old: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM offline_queue
            WHERE synced_at IS NOT NULL
            AND synced_at < datetime('now', '-' || ?1 || ' days')
            "#,
        )
        .bind(days_old)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn set_setting(key: &str, value: &str) -> QueuedOp {
        QueuedOp::SetSetting {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_drain_order_is_fifo() {
        let db = test_db().await;
        let queue = db.queue();

        let first = queue.enqueue(&set_setting("a", "1")).await.unwrap();
        let second = queue.enqueue(&set_setting("b", "2")).await.unwrap();

        let pending = queue.pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);
        assert_eq!(pending[0].op, set_setting("a", "1"));
    }

    #[tokio::test]
    async fn test_mark_synced_removes_from_pending() {
        let db = test_db().await;
        let queue = db.queue();

        let entry = queue.enqueue(&set_setting("a", "1")).await.unwrap();
        assert_eq!(queue.count_pending().await.unwrap(), 1);

        queue.mark_synced(&entry.id).await.unwrap();
        assert_eq!(queue.count_pending().await.unwrap(), 0);
        assert!(queue.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_failed_increments_attempts_and_keeps_entry() {
        let db = test_db().await;
        let queue = db.queue();

        let entry = queue.enqueue(&set_setting("a", "1")).await.unwrap();
        queue.mark_failed(&entry.id, "connection refused").await.unwrap();
        queue.mark_failed(&entry.id, "timed out").await.unwrap();

        let pending = queue.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("timed out"));
        assert!(pending[0].attempted_at.is_some());
    }

    #[tokio::test]
    async fn test_payload_survives_round_trip() {
        let db = test_db().await;
        let queue = db.queue();

        let op = QueuedOp::ProcessExit {
            plate_number: "ABC-123".to_string(),
            requested_at: Utc::now(),
        };
        queue.enqueue(&op).await.unwrap();

        let pending = queue.pending(1).await.unwrap();
        assert_eq!(pending[0].op.kind(), "process_exit");
        assert_eq!(pending[0].op, op);
    }
}
