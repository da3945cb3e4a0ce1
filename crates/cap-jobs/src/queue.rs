//! Persistent job queue, grounded on
//! `bpi_receipts::storage::ReceiptStore`: a `sqlx::SqlitePool` with WAL
//! mode, an index created on startup, and selection + lease transition
//! wrapped in one transaction for strict serializability.

use crate::ids::derive_task_id;
use crate::types::{JobKind, JobPayload, JobReceipt, JobRequest, QueueItem, QueueStatus};
use cap_enc::{decode, encode, FromValue, ToValue};
use cap_errors::CapError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    pub status: Option<QueueStatus>,
    pub kind: Option<JobKind>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueueStats {
    pub queued: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub expired: i64,
}

pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    /// Opens (creating if absent) a SQLite-backed queue at `url`, e.g.
    /// `sqlite://path/to/jobs.db` or `sqlite::memory:`. Enables WAL mode
    /// and `synchronous = NORMAL`, and creates the `jobs` table plus its
    /// selection and filtering indexes if they don't already exist.
    pub async fn connect(url: &str) -> Result<Self, CapError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| CapError::cap_error(format!("invalid queue url: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| CapError::cap_error(format!("failed to open queue db: {e}")))?;

        let queue = Self { pool };
        queue.migrate().await?;
        Ok(queue)
    }

    async fn migrate(&self) -> Result<(), CapError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                task_id      BLOB PRIMARY KEY,
                kind         TEXT NOT NULL,
                chain_id     INTEGER NOT NULL,
                height       INTEGER NOT NULL,
                tx_hash      BLOB NOT NULL,
                caller       BLOB NOT NULL,
                payload      BLOB NOT NULL,
                priority     REAL NOT NULL,
                status       TEXT NOT NULL,
                attempts     INTEGER NOT NULL DEFAULT 0,
                error        TEXT,
                result       BLOB,
                enqueued_at  INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_selection \
             ON jobs (status, priority DESC, enqueued_at ASC)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_kind_status ON jobs (kind, status)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    /// Derives `task_id`, then inserts the row if it doesn't already exist.
    /// Idempotent: a duplicate enqueue returns the existing row's receipt
    /// unchanged.
    pub async fn enqueue(
        &self,
        req: &JobRequest,
        chain_id: i64,
        height: i64,
        tx_hash: &[u8],
        caller: &[u8],
        priority: f64,
    ) -> Result<JobReceipt, CapError> {
        let payload_value = req.payload.to_value();
        let payload_bytes = encode(&payload_value)?;
        let task_id = derive_task_id(chain_id, height, tx_hash, caller, &payload_bytes)?;

        if let Some(existing) = self.get(&task_id).await? {
            return Ok(JobReceipt {
                task_id,
                kind: existing.kind,
                caller: existing.caller,
                chain_id: existing.chain_id,
                height_hint: req.height_hint,
                created_at: req.created_at,
                note: Some("duplicate enqueue, existing row returned".to_string()),
            });
        }

        let now = req.created_at;
        sqlx::query(
            "INSERT OR IGNORE INTO jobs \
             (task_id, kind, chain_id, height, tx_hash, caller, payload, priority, status, \
              attempts, error, result, enqueued_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL, ?, ?)",
        )
        .bind(task_id.to_vec())
        .bind(req.kind.as_str())
        .bind(chain_id)
        .bind(height)
        .bind(tx_hash)
        .bind(caller)
        .bind(&payload_bytes)
        .bind(priority)
        .bind(QueueStatus::Queued.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(JobReceipt {
            task_id,
            kind: req.kind,
            caller: caller.to_vec(),
            chain_id,
            height_hint: req.height_hint,
            created_at: req.created_at,
            note: None,
        })
    }

    /// Atomically selects the highest-priority, oldest `QUEUED` row
    /// (optionally filtered by kind) and marks it `IN_PROGRESS`, all inside
    /// one transaction so no two callers can lease the same row.
    pub async fn pop_next(
        &self,
        kind: Option<JobKind>,
        now: i64,
    ) -> Result<Option<(Box<[u8; 32]>, JobRequest)>, CapError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = if let Some(kind) = kind {
            sqlx::query(
                "SELECT task_id, kind, chain_id, height, tx_hash, caller, payload, enqueued_at \
                 FROM jobs WHERE status = ? AND kind = ? \
                 ORDER BY priority DESC, enqueued_at ASC, task_id ASC LIMIT 1",
            )
            .bind(QueueStatus::Queued.as_str())
            .bind(kind.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
        } else {
            sqlx::query(
                "SELECT task_id, kind, chain_id, height, tx_hash, caller, payload, enqueued_at \
                 FROM jobs WHERE status = ? \
                 ORDER BY priority DESC, enqueued_at ASC, task_id ASC LIMIT 1",
            )
            .bind(QueueStatus::Queued.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
        };

        let Some(row) = row else {
            tx.commit().await.map_err(db_err)?;
            return Ok(None);
        };

        let task_id_bytes: Vec<u8> = row.try_get("task_id").map_err(db_err)?;
        sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE task_id = ? AND status = ?")
            .bind(QueueStatus::InProgress.as_str())
            .bind(now)
            .bind(&task_id_bytes)
            .bind(QueueStatus::Queued.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        let mut task_id = [0u8; 32];
        task_id.copy_from_slice(&task_id_bytes);

        let kind_str: String = row.try_get("kind").map_err(db_err)?;
        let payload_bytes: Vec<u8> = row.try_get("payload").map_err(db_err)?;
        let payload_value = decode(&payload_bytes)?;
        let payload = JobPayload::from_value(&payload_value).map_err(CapError::from)?;
        let caller: Vec<u8> = row.try_get("caller").map_err(db_err)?;
        let chain_id: i64 = row.try_get("chain_id").map_err(db_err)?;
        let enqueued_at: i64 = row.try_get("enqueued_at").map_err(db_err)?;

        let req = JobRequest {
            kind: parse_kind(&kind_str)?,
            caller,
            chain_id,
            payload,
            height_hint: None,
            created_at: enqueued_at,
        };

        Ok(Some((Box::new(task_id), req)))
    }

    pub async fn requeue(&self, task_id: &[u8; 32], backoff_seconds: i64, now: i64) -> Result<(), CapError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, attempts = attempts + 1, updated_at = ? \
             WHERE task_id = ?",
        )
        .bind(QueueStatus::Queued.as_str())
        .bind(now + backoff_seconds.max(0))
        .bind(task_id.to_vec())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CapError::cap_error("requeue: task_id not found").with_retryable(false));
        }
        Ok(())
    }

    pub async fn complete(&self, task_id: &[u8; 32], result_bytes: &[u8], now: i64) -> Result<(), CapError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, result = ?, updated_at = ? WHERE task_id = ?",
        )
        .bind(QueueStatus::Completed.as_str())
        .bind(result_bytes)
        .bind(now)
        .bind(task_id.to_vec())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CapError::cap_error("complete: task_id not found").with_retryable(false));
        }
        Ok(())
    }

    pub async fn fail(&self, task_id: &[u8; 32], error: &str, now: i64) -> Result<(), CapError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, error = ?, attempts = attempts + 1, updated_at = ? \
             WHERE task_id = ?",
        )
        .bind(QueueStatus::Failed.as_str())
        .bind(error)
        .bind(now)
        .bind(task_id.to_vec())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CapError::cap_error("fail: task_id not found").with_retryable(false));
        }
        Ok(())
    }

    pub async fn delete(&self, task_id: &[u8; 32]) -> Result<(), CapError> {
        sqlx::query("DELETE FROM jobs WHERE task_id = ?")
            .bind(task_id.to_vec())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn list(
        &self,
        filter: &QueueFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QueueItem>, CapError> {
        let rows = match (&filter.status, &filter.kind) {
            (Some(status), Some(kind)) => sqlx::query(
                "SELECT * FROM jobs WHERE status = ? AND kind = ? \
                 ORDER BY priority DESC, enqueued_at ASC, task_id ASC LIMIT ? OFFSET ?",
            )
            .bind(status.as_str())
            .bind(kind.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
            (Some(status), None) => sqlx::query(
                "SELECT * FROM jobs WHERE status = ? \
                 ORDER BY priority DESC, enqueued_at ASC, task_id ASC LIMIT ? OFFSET ?",
            )
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
            (None, Some(kind)) => sqlx::query(
                "SELECT * FROM jobs WHERE kind = ? \
                 ORDER BY priority DESC, enqueued_at ASC, task_id ASC LIMIT ? OFFSET ?",
            )
            .bind(kind.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
            (None, None) => sqlx::query(
                "SELECT * FROM jobs \
                 ORDER BY priority DESC, enqueued_at ASC, task_id ASC LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
        };

        rows.into_iter().map(row_to_item).collect()
    }

    pub async fn stats(&self) -> Result<QueueStats, CapError> {
        let rows = sqlx::query("SELECT status, COUNT(*) as n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(db_err)?;
            let n: i64 = row.try_get("n").map_err(db_err)?;
            match QueueStatus::parse(&status) {
                Some(QueueStatus::Queued) => stats.queued = n,
                Some(QueueStatus::InProgress) => stats.in_progress = n,
                Some(QueueStatus::Completed) => stats.completed = n,
                Some(QueueStatus::Failed) => stats.failed = n,
                Some(QueueStatus::Expired) => stats.expired = n,
                None => {}
            }
        }
        Ok(stats)
    }

    async fn get(&self, task_id: &[u8; 32]) -> Result<Option<QueueItemSummary>, CapError> {
        let row = sqlx::query("SELECT kind, chain_id, caller FROM jobs WHERE task_id = ?")
            .bind(task_id.to_vec())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };
        let kind_str: String = row.try_get("kind").map_err(db_err)?;
        Ok(Some(QueueItemSummary {
            kind: parse_kind(&kind_str)?,
            chain_id: row.try_get("chain_id").map_err(db_err)?,
            caller: row.try_get("caller").map_err(db_err)?,
        }))
    }
}

struct QueueItemSummary {
    kind: JobKind,
    chain_id: i64,
    caller: Vec<u8>,
}

fn parse_kind(s: &str) -> Result<JobKind, CapError> {
    match s {
        "AI" => Ok(JobKind::Ai),
        "QUANTUM" => Ok(JobKind::Quantum),
        other => Err(CapError::cap_error(format!("corrupt queue row: unknown kind {other}"))),
    }
}

fn row_to_item(row: sqlx::sqlite::SqliteRow) -> Result<QueueItem, CapError> {
    let task_id_bytes: Vec<u8> = row.try_get("task_id").map_err(db_err)?;
    let mut task_id = [0u8; 32];
    if task_id_bytes.len() == 32 {
        task_id.copy_from_slice(&task_id_bytes);
    }
    let kind_str: String = row.try_get("kind").map_err(db_err)?;
    let status_str: String = row.try_get("status").map_err(db_err)?;

    Ok(QueueItem {
        task_id,
        kind: parse_kind(&kind_str)?,
        chain_id: row.try_get("chain_id").map_err(db_err)?,
        height: row.try_get("height").map_err(db_err)?,
        tx_hash: row.try_get("tx_hash").map_err(db_err)?,
        caller: row.try_get("caller").map_err(db_err)?,
        payload_bytes: row.try_get("payload").map_err(db_err)?,
        priority: row.try_get("priority").map_err(db_err)?,
        status: QueueStatus::parse(&status_str)
            .ok_or_else(|| CapError::cap_error("corrupt queue row: unknown status"))?,
        attempts: row.try_get("attempts").map_err(db_err)?,
        error: row.try_get("error").map_err(db_err)?,
        result_bytes: row.try_get("result").map_err(db_err)?,
        enqueued_at: row.try_get("enqueued_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> CapError {
    CapError::cap_error(format!("queue storage error: {e}")).with_retryable(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> JobRequest {
        JobRequest {
            kind: JobKind::Ai,
            caller: b"caller".to_vec(),
            chain_id: 1,
            payload: JobPayload::Ai {
                model: "tiny".to_string(),
                prompt: b"hi".to_vec(),
                params: None,
            },
            height_hint: None,
            created_at: 1000,
        }
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_by_task_id() {
        let queue = JobQueue::connect("sqlite::memory:").await.unwrap();
        let req = sample_request();
        let a = queue.enqueue(&req, 1, 10, b"tx", b"caller", 1.0).await.unwrap();
        let b = queue.enqueue(&req, 1, 10, b"tx", b"caller", 1.0).await.unwrap();
        assert_eq!(a.task_id, b.task_id);
        assert!(b.note.is_some());

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queued, 1);
    }

    #[tokio::test]
    async fn pop_next_leases_and_hides_from_further_pops() {
        let queue = JobQueue::connect("sqlite::memory:").await.unwrap();
        let req = sample_request();
        queue.enqueue(&req, 1, 10, b"tx", b"caller", 1.0).await.unwrap();

        let (task_id, leased) = queue.pop_next(None, 2000).await.unwrap().unwrap();
        assert_eq!(leased.kind, JobKind::Ai);

        let second = queue.pop_next(None, 2001).await.unwrap();
        assert!(second.is_none());

        queue.complete(&task_id, b"result", 3000).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn requeue_resets_status_and_increments_attempts() {
        let queue = JobQueue::connect("sqlite::memory:").await.unwrap();
        let req = sample_request();
        queue.enqueue(&req, 1, 10, b"tx", b"caller", 1.0).await.unwrap();
        let (task_id, _) = queue.pop_next(None, 2000).await.unwrap().unwrap();

        queue.requeue(&task_id, 0, 2500).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queued, 1);

        let items = queue.list(&QueueFilter::default(), 10, 0).await.unwrap();
        assert_eq!(items[0].attempts, 1);
    }

    #[tokio::test]
    async fn fail_unknown_task_id_is_a_terminal_error() {
        let queue = JobQueue::connect("sqlite::memory:").await.unwrap();
        let err = queue.fail(&[9u8; 32], "boom", 0).await.unwrap_err();
        assert!(!err.retryable);
    }
}
