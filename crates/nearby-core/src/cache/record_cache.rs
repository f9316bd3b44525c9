use super::expiring::{CacheStats, ExpiringCache};
use crate::records::{Record, RecordId};
use dashmap::DashMap;
use std::time::Duration;

/// Record snapshots keyed by id.
///
/// Every eviction bumps a per-id generation. A fill records the generation
/// before reading the store and is dropped if an eviction happened since, so
/// a read that raced a mutation cannot re-cache the old snapshot.
pub struct RecordCache {
    inner: ExpiringCache<RecordId, Record>,
    generations: DashMap<RecordId, u64>,
    ttl: Duration,
}

impl RecordCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: ExpiringCache::new(),
            generations: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.inner.get(&id)
    }

    /// Generation to pass to [`RecordCache::put_if_current`]; read it before
    /// fetching from the store.
    pub fn generation(&self, id: RecordId) -> u64 {
        self.generations.get(&id).map(|g| *g).unwrap_or(0)
    }

    /// Cache `record` unless it was evicted after `seen` was read.
    /// Returns whether the snapshot was stored.
    pub fn put_if_current(&self, record: Record, seen: u64) -> bool {
        // holding the generation entry blocks a concurrent evict until the insert lands
        let current = self.generations.entry(record.id).or_insert(0);
        if *current != seen {
            return false;
        }
        self.inner.put(record.id, record, self.ttl);
        true
    }

    /// Drop the cached snapshot after a mutation.
    pub fn evict(&self, id: RecordId) {
        *self.generations.entry(id).or_insert(0) += 1;
        self.inner.invalidate(&id);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> &CacheStats {
        self.inner.stats()
    }
}
