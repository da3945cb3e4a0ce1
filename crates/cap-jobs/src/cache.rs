//! Per-process bounded LRU result cache with block-aware eviction and
//! reorg rewind, grounded on `lru::LruCache` plus
//! `bpi_receipts::storage::ReceiptStore`'s manual cache-eviction-on-overflow
//! loop, generalized to the sliding-window + reorg semantics spec.md §4.9
//! requires.

use crate::types::ResultRecord;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

// `ResultRecord` (spec.md §3) carries no `caller` field and `put()`'s
// signature (spec.md §4.9) takes none either, so the only secondary index
// this cache can maintain from its own inputs is by availability height.
// Caller-scoped lookups live on the persistent `ResultStore`
// (`list_by_caller`), which does see the caller at write time.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub items: usize,
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub reorg_resets: u64,
    pub heights_tracked: usize,
}

struct Entry {
    record: ResultRecord,
    available_height: i64,
}

struct Inner {
    lru: LruCache<[u8; 32], Entry>,
    by_height: HashMap<i64, HashSet<[u8; 32]>>,
    head: Option<i64>,
    keep_blocks: i64,
    stats: CacheStats,
}

/// Bounded LRU keyed by `task_id`, with secondary indexes by caller and by
/// availability height.
pub struct ResultCache {
    inner: Mutex<Inner>,
}

impl ResultCache {
    pub fn new(max_items: usize, keep_blocks: i64) -> Self {
        let capacity = NonZeroUsize::new(max_items.max(1)).unwrap();
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(capacity),
                by_height: HashMap::new(),
                head: None,
                keep_blocks: keep_blocks.max(0),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Advances the head to `height`. If the head increased past the
    /// sliding window, evicts entries whose `available_height` fell below
    /// the window. If the head decreased (a reorg), evicts every entry
    /// whose `available_height` is now beyond the new head.
    pub fn begin_block(&self, height: i64) {
        let mut inner = self.inner.lock();
        let previous = inner.head;
        inner.head = Some(height);

        match previous {
            Some(prev) if height < prev => {
                // Reorg: drop everything that claims availability past the
                // new head; it cannot have been honestly observed yet.
                let stale_heights: Vec<i64> = inner
                    .by_height
                    .keys()
                    .copied()
                    .filter(|h| *h > height)
                    .collect();
                let mut to_remove = Vec::new();
                for h in stale_heights {
                    if let Some(ids) = inner.by_height.remove(&h) {
                        to_remove.extend(ids);
                    }
                }
                for task_id in &to_remove {
                    Self::remove_locked(&mut inner, task_id);
                }
                if !to_remove.is_empty() {
                    inner.stats.reorg_resets += 1;
                }
            }
            _ => {
                let keep_blocks = inner.keep_blocks;
                let floor = height - keep_blocks;
                let expired_heights: Vec<i64> = inner
                    .by_height
                    .keys()
                    .copied()
                    .filter(|h| *h <= floor)
                    .collect();
                let mut to_remove = Vec::new();
                for h in expired_heights {
                    if let Some(ids) = inner.by_height.remove(&h) {
                        to_remove.extend(ids);
                    }
                }
                for task_id in &to_remove {
                    Self::remove_locked(&mut inner, task_id);
                    inner.stats.evictions += 1;
                }
            }
        }
        inner.stats.items = inner.lru.len();
        inner.stats.heights_tracked = inner.by_height.len();
    }

    pub fn put(&self, task_id: [u8; 32], record: ResultRecord, available_height: Option<i64>) {
        let mut inner = self.inner.lock();
        let height = available_height.unwrap_or(record.height_available);

        if let Some((_, old)) = inner.lru.push(
            task_id,
            Entry {
                record,
                available_height: height,
            },
        ) {
            Self::unindex(&mut inner, &task_id, &old);
        }
        inner.by_height.entry(height).or_default().insert(task_id);
        inner.stats.puts += 1;
        inner.stats.items = inner.lru.len();
        inner.stats.heights_tracked = inner.by_height.len();
    }

    pub fn get(&self, task_id: &[u8; 32]) -> Option<ResultRecord> {
        let mut inner = self.inner.lock();
        match inner.lru.get(task_id) {
            Some(entry) => {
                let record = entry.record.clone();
                inner.stats.hits += 1;
                Some(record)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub fn has(&self, task_id: &[u8; 32]) -> bool {
        self.inner.lock().lru.contains(task_id)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.by_height.clear();
        inner.stats.items = 0;
        inner.stats.heights_tracked = 0;
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    fn unindex(inner: &mut Inner, task_id: &[u8; 32], entry: &Entry) {
        if let Some(ids) = inner.by_height.get_mut(&entry.available_height) {
            ids.remove(task_id);
            if ids.is_empty() {
                inner.by_height.remove(&entry.available_height);
            }
        }
    }

    fn remove_locked(inner: &mut Inner, task_id: &[u8; 32]) {
        if let Some(entry) = inner.lru.pop(task_id) {
            if let Some(ids) = inner.by_height.get_mut(&entry.available_height) {
                ids.remove(task_id);
                if ids.is_empty() {
                    inner.by_height.remove(&entry.available_height);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;

    fn record(height_available: i64) -> ResultRecord {
        ResultRecord {
            task_id: [0u8; 32],
            kind: JobKind::Ai,
            success: true,
            height_available,
            output_digest: vec![1, 2, 3],
            output_pointer: None,
            metrics: cap_enc::Value::Null,
            error: None,
            completed_at: 0,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = ResultCache::new(10, 5);
        let id = [1u8; 32];
        cache.put(id, record(1), None);
        assert!(cache.get(&id).is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_is_counted() {
        let cache = ResultCache::new(10, 5);
        assert!(cache.get(&[9u8; 32]).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn sliding_window_evicts_old_heights_on_advance() {
        let cache = ResultCache::new(100, 2);
        let old = [1u8; 32];
        cache.put(old, record(1), Some(1));
        cache.begin_block(1);
        cache.begin_block(10); // window of 2: floor = 8, height 1 <= 8 evicted
        assert!(!cache.has(&old));
        assert!(cache.stats().evictions >= 1);
    }

    #[test]
    fn reorg_rewind_drops_entries_past_new_head() {
        let cache = ResultCache::new(100, 1000);
        cache.begin_block(10);
        let future = [2u8; 32];
        cache.put(future, record(10), Some(10));
        assert!(cache.has(&future));
        cache.begin_block(5); // reorg: new head below the entry's height
        assert!(!cache.has(&future));
        assert_eq!(cache.stats().reorg_resets, 1);
    }

    #[test]
    fn item_cap_is_enforced_by_underlying_lru() {
        let cache = ResultCache::new(1, 1000);
        cache.put([1u8; 32], record(1), Some(1));
        cache.put([2u8; 32], record(1), Some(1));
        assert!(!cache.has(&[1u8; 32]));
        assert!(cache.has(&[2u8; 32]));
    }
}
