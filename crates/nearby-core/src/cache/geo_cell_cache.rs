use super::expiring::{CacheStats, ExpiringCache};
use crate::records::RecordId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Cache key: a geohash cell at a given precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeoCellKey {
    pub precision: u8,
    pub cell: String,
}

impl GeoCellKey {
    pub fn new(precision: u8, cell: impl Into<String>) -> Self {
        Self {
            precision,
            cell: cell.into(),
        }
    }
}

impl fmt::Display for GeoCellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "geo:{}:{}", self.precision, self.cell)
    }
}

/// Candidate record ids per geohash cell.
///
/// Emptied wholesale by every sync batch that applied at least one event.
pub struct GeoCellCache {
    inner: ExpiringCache<GeoCellKey, Arc<Vec<RecordId>>>,
    ttl: Duration,
}

impl GeoCellCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: ExpiringCache::new(),
            ttl,
        }
    }

    pub fn get(&self, precision: u8, cell: &str) -> Option<Arc<Vec<RecordId>>> {
        self.inner.get(&GeoCellKey::new(precision, cell))
    }

    pub fn put(&self, precision: u8, cell: &str, ids: Arc<Vec<RecordId>>) {
        self.inner.put(GeoCellKey::new(precision, cell), ids, self.ttl);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        self.inner.stats()
    }
}
