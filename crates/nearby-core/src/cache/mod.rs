//! In-memory TTL caches.
//!
//! - [`ExpiringCache`]: generic concurrent map with lazy per-entry expiry
//! - [`RecordCache`]: record id to record snapshot
//! - [`GeoCellCache`]: (precision, cell) to candidate record ids

mod expiring;
mod geo_cell_cache;
mod record_cache;

pub use expiring::{CacheEntry, CacheStats, ExpiringCache};
pub use geo_cell_cache::{GeoCellCache, GeoCellKey};
pub use record_cache::RecordCache;
