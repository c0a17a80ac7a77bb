//! SQLite-backed implementation of the operation queue port.
//!
//! Every mutation here is one small transaction. Claiming in particular
//! selects eligible rows and flips them to in-flight inside a single
//! immediate transaction, so two concurrent drain triggers can never claim
//! the same operation, and a crash mid-dispatch leaves the row recoverable
//! via `release_in_flight` on the next launch.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use tideline_core::ports::OperationQueue;
use tideline_domain::{
    OperationStatus, Priority, QueueCounts, QueuedOperation, Result as DomainResult,
};
use tokio::task;
use tracing::warn;

use super::manager::DbManager;
use crate::errors::{map_join_error, InfraError};

/// SQLite-backed queue repository.
pub struct SqliteQueueRepository {
    db: Arc<DbManager>,
}

impl SqliteQueueRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn insert_operation(conn: &Connection, op: &QueuedOperation) -> DomainResult<()> {
        conn.execute(
            QUEUE_INSERT_SQL,
            params![
                op.id,
                op.kind,
                op.payload_json,
                op.priority.to_string(),
                op.created_at,
                op.attempts,
                op.next_attempt_at,
                op.status.to_string(),
                op.last_error,
            ],
        )
        .map(|_| ())
        .map_err(map_sql_error)
    }

    fn claim_rows(
        conn: &mut Connection,
        now: i64,
        limit: usize,
    ) -> DomainResult<Vec<QueuedOperation>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;

        let mut claimed = {
            let mut stmt = tx.prepare(QUEUE_CLAIM_SELECT_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![now, usize_to_i64(limit)], map_queue_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
        };

        for op in &claimed {
            tx.execute(QUEUE_CLAIM_UPDATE_SQL, params![op.id]).map_err(map_sql_error)?;
        }

        tx.commit().map_err(map_sql_error)?;

        for op in &mut claimed {
            op.status = OperationStatus::InFlight;
        }
        Ok(claimed)
    }
}

#[async_trait]
impl OperationQueue for SqliteQueueRepository {
    async fn enqueue(&self, op: &QueuedOperation) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let to_insert = op.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            Self::insert_operation(&conn, &to_insert)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn claim_due(&self, now: i64, limit: usize) -> DomainResult<Vec<QueuedOperation>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<QueuedOperation>> {
            let mut conn = db.get_connection()?;
            Self::claim_rows(&mut conn, now, limit)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn remove(&self, id: &str) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![id])
                .map(|_| ())
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn reschedule(
        &self,
        id: &str,
        attempts: u32,
        next_attempt_at: i64,
        error: &str,
    ) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let error = error.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE sync_queue
                 SET status = 'failed_retryable', attempts = ?2, next_attempt_at = ?3,
                     last_error = ?4
                 WHERE id = ?1",
                params![id, attempts, next_attempt_at, error],
            )
            .map(|_| ())
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_dead(&self, id: &str, error: &str) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let error = error.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE sync_queue
                 SET status = 'failed_dead', next_attempt_at = NULL, last_error = ?2
                 WHERE id = ?1",
                params![id, error],
            )
            .map(|_| ())
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn release_in_flight(&self) -> DomainResult<u64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<u64> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE sync_queue SET status = 'pending' WHERE status = 'in_flight'",
                [],
            )
            .map(|changed| changed as u64)
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn counts(&self) -> DomainResult<QueueCounts> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<QueueCounts> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))
                .map_err(map_sql_error)?;

            let mut counts = QueueCounts::default();
            for row in rows {
                let (status, count) = row.map_err(map_sql_error)?;
                match status.as_str() {
                    "pending" | "failed_retryable" => counts.pending += count,
                    "in_flight" => counts.in_flight += count,
                    "failed_dead" => counts.dead += count,
                    other => warn!(status = %other, "unrecognised status in queue table"),
                }
            }
            Ok(counts)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn clear(&self) -> DomainResult<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM sync_queue", []).map(|_| ()).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn dead_letters(&self) -> DomainResult<Vec<QueuedOperation>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<QueuedOperation>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(QUEUE_DEAD_LETTERS_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map([], map_queue_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn retry_dead(&self, id: &str) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE sync_queue
                 SET status = 'pending', attempts = 0, next_attempt_at = NULL, last_error = NULL
                 WHERE id = ?1 AND status = 'failed_dead'",
                params![id],
            )
            .map(|changed| changed > 0)
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn remove_dead(&self, id: &str) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            conn.execute(
                "DELETE FROM sync_queue WHERE id = ?1 AND status = 'failed_dead'",
                params![id],
            )
            .map(|changed| changed > 0)
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

const QUEUE_INSERT_SQL: &str = "INSERT INTO sync_queue (
        id, kind, payload_json, priority, created_at, attempts, next_attempt_at, status, last_error
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const QUEUE_CLAIM_SELECT_SQL: &str = "SELECT
        id, kind, payload_json, priority, created_at, attempts, next_attempt_at, status, last_error
    FROM sync_queue
    WHERE status IN ('pending', 'failed_retryable')
      AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
    ORDER BY CASE priority
            WHEN 'critical' THEN 0
            WHEN 'high' THEN 1
            WHEN 'normal' THEN 2
            ELSE 3
        END ASC,
        created_at ASC
    LIMIT ?2";

const QUEUE_CLAIM_UPDATE_SQL: &str =
    "UPDATE sync_queue SET status = 'in_flight' WHERE id = ?1";

const QUEUE_DEAD_LETTERS_SQL: &str = "SELECT
        id, kind, payload_json, priority, created_at, attempts, next_attempt_at, status, last_error
    FROM sync_queue
    WHERE status = 'failed_dead'
    ORDER BY created_at ASC";

fn map_queue_row(row: &Row<'_>) -> rusqlite::Result<QueuedOperation> {
    let id: String = row.get(0)?;
    let priority_raw: String = row.get(3)?;
    let status_raw: String = row.get(7)?;

    Ok(QueuedOperation {
        kind: row.get(1)?,
        payload_json: row.get(2)?,
        priority: parse_priority(&id, &priority_raw),
        created_at: row.get(4)?,
        attempts: row.get(5)?,
        next_attempt_at: row.get(6)?,
        status: parse_status(&id, &status_raw),
        last_error: row.get(8)?,
        id,
    })
}

fn parse_priority(id: &str, raw: &str) -> Priority {
    match Priority::from_str(raw) {
        Ok(priority) => priority,
        Err(err) => {
            warn!(
                operation_id = %id,
                raw_priority = %raw,
                error = %err,
                "invalid priority in queue table - defaulting to normal"
            );
            Priority::Normal
        }
    }
}

fn parse_status(id: &str, raw: &str) -> OperationStatus {
    match OperationStatus::from_str(raw) {
        Ok(status) => status,
        Err(err) => {
            warn!(
                operation_id = %id,
                raw_status = %raw,
                error = %err,
                "invalid status in queue table - defaulting to pending"
            );
            OperationStatus::Pending
        }
    }
}

fn map_sql_error(err: rusqlite::Error) -> tideline_domain::TidelineError {
    InfraError::from(err).into()
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
