//! `result.read(ctx, task_id, consume=false) -> ResultView`: the
//! per-process [`cap_jobs::ResultCache`] is consulted first, falling back
//! to the persistent [`cap_jobs::ResultStore`] on a miss.

use crate::registry::Provider;
use async_trait::async_trait;
use cap_adapters::SyscallContext;
use cap_enc::{sha3_256, Value};
use cap_errors::CapError;
use cap_jobs::{ResultCache, ResultRecord, ResultStore};
use cap_metrics::CapMetrics;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// `result.read(consume=true)` is atomic only within this process, per the
/// resolved Open Question in spec.md §9: the consumed-set lives here, not
/// in the persistent store, so it is never claimed as cross-process.
pub struct ResultReadProvider {
    cache: Arc<ResultCache>,
    store: Arc<dyn ResultStore>,
    consumed: Mutex<HashSet<[u8; 32]>>,
    metrics: Arc<CapMetrics>,
}

impl ResultReadProvider {
    pub fn new(cache: Arc<ResultCache>, store: Arc<dyn ResultStore>, metrics: Arc<CapMetrics>) -> Self {
        Self {
            cache,
            store,
            consumed: Mutex::new(HashSet::new()),
            metrics,
        }
    }

    fn placeholder_digest(task_id: &[u8; 32]) -> [u8; 32] {
        sha3_256(task_id)
    }

    async fn load(&self, task_id: &[u8; 32]) -> Result<Option<ResultRecord>, CapError> {
        if let Some(record) = self.cache.get(task_id) {
            return Ok(Some(record));
        }
        let record = self.store.get(task_id).await?;
        if let Some(record) = &record {
            self.cache.put(*task_id, record.clone(), Some(record.height_available));
        }
        Ok(record)
    }
}

#[async_trait]
impl Provider for ResultReadProvider {
    async fn call(&self, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
        let task_id_bytes = kwargs
            .get("task_id")
            .and_then(Value::as_bytes)
            .ok_or_else(|| CapError::invalid_input("result.read: missing task_id"))?;
        if task_id_bytes.len() != 32 {
            return Err(CapError::invalid_input("result.read: task_id must be 32 bytes"));
        }
        let mut task_id = [0u8; 32];
        task_id.copy_from_slice(task_id_bytes);

        let consume = kwargs
            .get("consume")
            .and_then(|v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            })
            .unwrap_or(false);

        let Some(record) = self.load(&task_id).await? else {
            self.metrics.record_result_read("pending");
            return Ok(Value::map(vec![(Value::text("status"), Value::text("PENDING"))]));
        };

        let ready_height = record.height_available;
        let min_read_height = ready_height + 1;
        if (ctx.height as i64) < min_read_height {
            self.metrics.record_result_read("not_yet");
            return Ok(Value::map(vec![
                (Value::text("status"), Value::text("NOT_YET")),
                (Value::text("ready_height"), Value::int(ready_height)),
                (Value::text("min_read_height"), Value::int(min_read_height)),
            ]));
        }

        let output_digest = if record.output_digest.is_empty() {
            Self::placeholder_digest(&task_id).to_vec()
        } else {
            record.output_digest.clone()
        };

        // `consumed` reflects whether this task_id has ever been consumed, not
        // just whether this particular call requested it: once a consume=true
        // call marks it, later reads (even with consume=false) see it as
        // already consumed.
        let was_already_consumed = {
            let mut guard = self.consumed.lock();
            let was_present = guard.contains(&task_id);
            if consume {
                guard.insert(task_id);
            }
            was_present
        };
        let consumed_flag = consume || was_already_consumed;

        self.metrics.record_result_read("ready");

        Ok(Value::map(vec![
            (Value::text("status"), Value::text("READY")),
            (Value::text("ready_height"), Value::int(ready_height)),
            (Value::text("consumed"), Value::Bool(consumed_flag)),
            (
                Value::text("result"),
                Value::map(vec![
                    (Value::text("success"), Value::Bool(record.success)),
                    (Value::text("output_digest"), Value::bytes(output_digest)),
                    (Value::text("output_pointer"), record.output_pointer.clone().into()),
                    (Value::text("metrics"), record.metrics.clone()),
                    (Value::text("error"), record.error.clone().into()),
                ]),
            ),
        ]))
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => Value::text(s),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cap_jobs::{JobKind, MemoryResultStore};

    fn ctx(height: u64) -> SyscallContext {
        SyscallContext::new(1, height, b"tx".to_vec(), b"caller".to_vec())
    }

    fn metrics() -> Arc<CapMetrics> {
        Arc::new(CapMetrics::new(&prometheus::Registry::new()).unwrap())
    }

    fn kwargs(task_id: [u8; 32], consume: bool) -> Value {
        Value::map(vec![
            (Value::text("task_id"), Value::bytes(task_id.to_vec())),
            (Value::text("consume"), Value::Bool(consume)),
        ])
    }

    #[tokio::test]
    async fn missing_record_is_pending() {
        let provider = ResultReadProvider::new(
            Arc::new(ResultCache::new(100, 1000)),
            Arc::new(MemoryResultStore::new()),
            metrics(),
        );
        let result = provider.call(&ctx(20), &kwargs([1u8; 32], false)).await.unwrap();
        assert_eq!(result.get("status").unwrap().as_text(), Some("PENDING"));
    }

    #[tokio::test]
    async fn record_before_next_block_is_not_yet() {
        let store = Arc::new(MemoryResultStore::new());
        let task_id = [2u8; 32];
        store
            .put(
                b"caller",
                1,
                &ResultRecord {
                    task_id,
                    kind: JobKind::Ai,
                    success: true,
                    height_available: 20,
                    output_digest: vec![1],
                    output_pointer: None,
                    metrics: Value::Null,
                    error: None,
                    completed_at: 0,
                },
            )
            .await
            .unwrap();
        let provider = ResultReadProvider::new(Arc::new(ResultCache::new(100, 1000)), store, metrics());
        let result = provider.call(&ctx(20), &kwargs(task_id, false)).await.unwrap();
        assert_eq!(result.get("status").unwrap().as_text(), Some("NOT_YET"));
    }

    #[tokio::test]
    async fn record_at_next_block_is_ready() {
        let store = Arc::new(MemoryResultStore::new());
        let task_id = [3u8; 32];
        store
            .put(
                b"caller",
                1,
                &ResultRecord {
                    task_id,
                    kind: JobKind::Ai,
                    success: true,
                    height_available: 20,
                    output_digest: vec![1, 2],
                    output_pointer: None,
                    metrics: Value::Null,
                    error: None,
                    completed_at: 0,
                },
            )
            .await
            .unwrap();
        let provider = ResultReadProvider::new(Arc::new(ResultCache::new(100, 1000)), store, metrics());
        let result = provider.call(&ctx(21), &kwargs(task_id, false)).await.unwrap();
        assert_eq!(result.get("status").unwrap().as_text(), Some("READY"));
    }

    #[tokio::test]
    async fn missing_output_bytes_get_a_placeholder_digest() {
        let store = Arc::new(MemoryResultStore::new());
        let task_id = [4u8; 32];
        store
            .put(
                b"caller",
                1,
                &ResultRecord {
                    task_id,
                    kind: JobKind::Ai,
                    success: true,
                    height_available: 5,
                    output_digest: Vec::new(),
                    output_pointer: None,
                    metrics: Value::Null,
                    error: None,
                    completed_at: 0,
                },
            )
            .await
            .unwrap();
        let provider = ResultReadProvider::new(Arc::new(ResultCache::new(100, 1000)), store, metrics());
        let result = provider.call(&ctx(10), &kwargs(task_id, false)).await.unwrap();
        let digest = result
            .get("result")
            .and_then(|r| r.get("output_digest"))
            .and_then(Value::as_bytes)
            .unwrap();
        assert!(!digest.is_empty());
    }

    #[tokio::test]
    async fn consume_is_remembered_across_subsequent_reads() {
        let store = Arc::new(MemoryResultStore::new());
        let task_id = [5u8; 32];
        store
            .put(
                b"caller",
                1,
                &ResultRecord {
                    task_id,
                    kind: JobKind::Ai,
                    success: true,
                    height_available: 5,
                    output_digest: vec![1],
                    output_pointer: None,
                    metrics: Value::Null,
                    error: None,
                    completed_at: 0,
                },
            )
            .await
            .unwrap();
        let provider = ResultReadProvider::new(Arc::new(ResultCache::new(100, 1000)), store, metrics());

        let first = provider.call(&ctx(10), &kwargs(task_id, false)).await.unwrap();
        assert_eq!(first.get("consumed"), Some(&Value::Bool(false)));

        let second = provider.call(&ctx(10), &kwargs(task_id, true)).await.unwrap();
        assert_eq!(second.get("consumed"), Some(&Value::Bool(true)));

        // A later read that does not itself ask to consume still reports the
        // task_id as consumed, since a prior call already marked it so.
        let third = provider.call(&ctx(10), &kwargs(task_id, false)).await.unwrap();
        assert_eq!(third.get("consumed"), Some(&Value::Bool(true)));
    }
}
