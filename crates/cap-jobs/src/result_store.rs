//! Result store: two interchangeable backends behind one [`ResultStore`]
//! trait, grounded on `bpi_receipts::storage::ReceiptStore`'s
//! insert-or-replace + read-through-cache idiom.

use crate::types::{JobKind, ResultRecord};
use async_trait::async_trait;
use cap_errors::CapError;

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace. Updates the caller and height secondary indexes.
    async fn put(&self, caller: &[u8], chain_id: i64, record: &ResultRecord) -> Result<(), CapError>;

    async fn get(&self, task_id: &[u8; 32]) -> Result<Option<ResultRecord>, CapError>;

    async fn has(&self, task_id: &[u8; 32]) -> Result<bool, CapError> {
        Ok(self.get(task_id).await?.is_some())
    }

    async fn delete(&self, task_id: &[u8; 32]) -> Result<(), CapError>;

    /// Ordered by `(height DESC, created_at DESC)`.
    async fn list_recent(&self, limit: i64, offset: i64) -> Result<Vec<ResultRecord>, CapError>;

    /// Ordered by `(height DESC, created_at DESC)`.
    async fn list_by_caller(
        &self,
        caller: &[u8],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ResultRecord>, CapError>;

    /// Deletes every record whose `height_available + ttl_blocks < height`.
    /// Returns the number of records pruned. Grounded on
    /// `original_source/capabilities/jobs/result_store.py`'s periodic TTL
    /// sweep, which the distilled spec names via `results.ttl_blocks` but
    /// does not name as an explicit operation.
    async fn prune_expired(&self, height: i64, ttl_blocks: u64) -> Result<u64, CapError>;
}

pub mod memory {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    struct Row {
        caller: Vec<u8>,
        chain_id: i64,
        record: ResultRecord,
    }

    /// `RwLock<HashMap<...>>` backend for unit tests and single-process
    /// embedding, grounded on the same pattern the teacher's in-memory
    /// fallbacks use before a persistent backend is wired in.
    #[derive(Default)]
    pub struct MemoryResultStore {
        rows: RwLock<HashMap<[u8; 32], Row>>,
    }

    impl MemoryResultStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ResultStore for MemoryResultStore {
        async fn put(&self, caller: &[u8], chain_id: i64, record: &ResultRecord) -> Result<(), CapError> {
            self.rows.write().insert(
                record.task_id,
                Row {
                    caller: caller.to_vec(),
                    chain_id,
                    record: record.clone(),
                },
            );
            Ok(())
        }

        async fn get(&self, task_id: &[u8; 32]) -> Result<Option<ResultRecord>, CapError> {
            Ok(self.rows.read().get(task_id).map(|r| r.record.clone()))
        }

        async fn delete(&self, task_id: &[u8; 32]) -> Result<(), CapError> {
            self.rows.write().remove(task_id);
            Ok(())
        }

        async fn list_recent(&self, limit: i64, offset: i64) -> Result<Vec<ResultRecord>, CapError> {
            let rows = self.rows.read();
            let mut all: Vec<&Row> = rows.values().collect();
            all.sort_by(|a, b| {
                b.record
                    .height_available
                    .cmp(&a.record.height_available)
                    .then_with(|| b.record.completed_at.cmp(&a.record.completed_at))
            });
            Ok(page(all, limit, offset))
        }

        async fn list_by_caller(
            &self,
            caller: &[u8],
            limit: i64,
            offset: i64,
        ) -> Result<Vec<ResultRecord>, CapError> {
            let rows = self.rows.read();
            let mut matching: Vec<&Row> = rows.values().filter(|r| r.caller == caller).collect();
            matching.sort_by(|a, b| {
                b.record
                    .height_available
                    .cmp(&a.record.height_available)
                    .then_with(|| b.record.completed_at.cmp(&a.record.completed_at))
            });
            Ok(page(matching, limit, offset))
        }

        async fn prune_expired(&self, height: i64, ttl_blocks: u64) -> Result<u64, CapError> {
            let mut rows = self.rows.write();
            let before = rows.len();
            rows.retain(|_, r| r.record.height_available + ttl_blocks as i64 >= height);
            Ok((before - rows.len()) as u64)
        }
    }

    fn page(rows: Vec<&Row>, limit: i64, offset: i64) -> Vec<ResultRecord> {
        rows.into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|r| r.record.clone())
            .collect()
    }

    // Only referenced so the `chain_id` column isn't flagged unused by a
    // future reader looking for its secondary-index counterpart in the
    // sqlite backend.
    #[allow(dead_code)]
    fn _chain_id_is_carried(row: &Row) -> i64 {
        row.chain_id
    }
}

pub mod sqlite {
    use super::*;
    use cap_enc::{decode, encode};
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Row as _, SqlitePool};
    use std::str::FromStr;

    fn kind_to_int(kind: JobKind) -> i64 {
        match kind {
            JobKind::Ai => 0,
            JobKind::Quantum => 1,
        }
    }

    fn kind_from_int(n: i64) -> Result<JobKind, CapError> {
        match n {
            0 => Ok(JobKind::Ai),
            1 => Ok(JobKind::Quantum),
            other => Err(CapError::cap_error(format!("corrupt results row: kind {other}"))),
        }
    }

    fn db_err(e: sqlx::Error) -> CapError {
        CapError::cap_error(format!("result store error: {e}")).with_retryable(false)
    }

    /// `sqlx::SqlitePool` backend matching spec.md §6's `results` table
    /// exactly: `(task_id PK bytes, caller bytes, kind int, chain_id int,
    /// height int, created_at int, record bytes)` with indexes
    /// `(caller, height DESC, created_at DESC)` and
    /// `(height DESC, created_at DESC)`.
    pub struct SqliteResultStore {
        pool: SqlitePool,
    }

    impl SqliteResultStore {
        pub async fn connect(url: &str) -> Result<Self, CapError> {
            let options = SqliteConnectOptions::from_str(url)
                .map_err(|e| CapError::cap_error(format!("invalid result store url: {e}")))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .foreign_keys(true);

            let pool = SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await
                .map_err(db_err)?;

            let store = Self { pool };
            store.migrate().await?;
            Ok(store)
        }

        async fn migrate(&self) -> Result<(), CapError> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS results (
                    task_id    BLOB PRIMARY KEY,
                    caller     BLOB NOT NULL,
                    kind       INTEGER NOT NULL,
                    chain_id   INTEGER NOT NULL,
                    height     INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    record     BLOB NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_results_caller \
                 ON results (caller, height DESC, created_at DESC)",
            )
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_results_recent \
                 ON results (height DESC, created_at DESC)",
            )
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(())
        }
    }

    #[async_trait]
    impl ResultStore for SqliteResultStore {
        async fn put(&self, caller: &[u8], chain_id: i64, record: &ResultRecord) -> Result<(), CapError> {
            let bytes = encode(&record.to_value())?;
            sqlx::query(
                "INSERT OR REPLACE INTO results \
                 (task_id, caller, kind, chain_id, height, created_at, record) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.task_id.to_vec())
            .bind(caller)
            .bind(kind_to_int(record.kind))
            .bind(chain_id)
            .bind(record.height_available)
            .bind(record.completed_at)
            .bind(bytes)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        }

        async fn get(&self, task_id: &[u8; 32]) -> Result<Option<ResultRecord>, CapError> {
            let row = sqlx::query("SELECT record FROM results WHERE task_id = ?")
                .bind(task_id.to_vec())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            let Some(row) = row else { return Ok(None) };
            let bytes: Vec<u8> = row.try_get("record").map_err(db_err)?;
            let value = decode(&bytes)?;
            Ok(Some(cap_enc::FromValue::from_value(&value)?))
        }

        async fn delete(&self, task_id: &[u8; 32]) -> Result<(), CapError> {
            sqlx::query("DELETE FROM results WHERE task_id = ?")
                .bind(task_id.to_vec())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(())
        }

        async fn list_recent(&self, limit: i64, offset: i64) -> Result<Vec<ResultRecord>, CapError> {
            let rows = sqlx::query(
                "SELECT record FROM results ORDER BY height DESC, created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows_to_records(rows)
        }

        async fn list_by_caller(
            &self,
            caller: &[u8],
            limit: i64,
            offset: i64,
        ) -> Result<Vec<ResultRecord>, CapError> {
            let rows = sqlx::query(
                "SELECT record FROM results WHERE caller = ? \
                 ORDER BY height DESC, created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(caller)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows_to_records(rows)
        }

        async fn prune_expired(&self, height: i64, ttl_blocks: u64) -> Result<u64, CapError> {
            let floor = height - ttl_blocks as i64;
            let result = sqlx::query("DELETE FROM results WHERE height < ?")
                .bind(floor)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(result.rows_affected())
        }
    }

    fn rows_to_records(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<ResultRecord>, CapError> {
        rows.into_iter()
            .map(|row| {
                let bytes: Vec<u8> = row.try_get("record").map_err(db_err)?;
                let value = decode(&bytes)?;
                cap_enc::FromValue::from_value(&value).map_err(CapError::from)
            })
            .collect()
    }

    // Referenced only to keep `kind_from_int` exercised; the `kind` column
    // is currently read back via the encoded record body rather than this
    // column, which instead backs any future `list_by_kind` filter.
    #[allow(dead_code)]
    fn _kind_roundtrips(kind: JobKind) -> Result<JobKind, CapError> {
        kind_from_int(kind_to_int(kind))
    }
}

pub use memory::MemoryResultStore;
pub use sqlite::SqliteResultStore;
