//! Generic expiring cache.
//!
//! Entries carry an absolute expiry instant. Nothing sweeps the map in the
//! background: an entry found expired on read is evicted and reported as a
//! miss. There is no size bound.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A cached value with its absolute expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,
    /// Instant at which the entry stops being served
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Create an entry that expires `ttl` from now.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// An entry is expired once `now` reaches its expiry instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry.
    pub fn time_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads that returned a live value
    pub hits: AtomicU64,
    /// Reads that found nothing (or only an expired entry)
    pub misses: AtomicU64,
    /// Expired entries removed on read
    pub evictions: AtomicU64,
    /// Explicit invalidations (single key or whole cache)
    pub invalidations: AtomicU64,
}

impl CacheStats {
    /// Hit rate in [0.0, 1.0]; 0.0 before the first read.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }
}

/// Concurrent key/value cache with per-entry TTL.
pub struct ExpiringCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    stats: CacheStats,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Return the value if present and unexpired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();

        // the shard guard must be released before remove_if below
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.stats.record_hit();
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired
            && self
                .entries
                .remove_if(key, |_, entry| entry.is_expired_at(now))
                .is_some()
        {
            self.stats.record_eviction();
        }
        self.stats.record_miss();
        None
    }

    /// Insert or replace the value for `key`, expiring after `ttl`.
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Remove a single key. Returns true if an entry was present.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.record_invalidation();
        }
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.record_invalidation();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K, V> Default for ExpiringCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
