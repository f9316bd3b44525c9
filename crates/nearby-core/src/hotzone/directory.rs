use super::{HotZoneConfig, HotZoneSource, HOT_ZONE_PREFIX_LEN};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

type ZoneMap = HashMap<String, HotZoneConfig>;

/// Active hot zones keyed by prefix.
///
/// The map is replaced wholesale on refresh; readers hold a cloned `Arc`
/// of either the previous or the new map, never a mix.
pub struct HotZoneDirectory {
    source: Arc<dyn HotZoneSource>,
    zones: RwLock<Arc<ZoneMap>>,
    last_refreshed_at: RwLock<Option<DateTime<Utc>>>,
    refresh_failures: AtomicU64,
}

impl HotZoneDirectory {
    /// Create an empty directory. Call [`refresh`](Self::refresh) to load.
    pub fn new(source: Arc<dyn HotZoneSource>) -> Self {
        Self {
            source,
            zones: RwLock::new(Arc::new(HashMap::new())),
            last_refreshed_at: RwLock::new(None),
            refresh_failures: AtomicU64::new(0),
        }
    }

    /// Reload from the source. On failure the previous map stays in place,
    /// the failure counter is bumped and the error is returned.
    pub async fn refresh(&self) -> Result<usize> {
        let result = self.load().await;
        if result.is_err() {
            self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn load(&self) -> Result<usize> {
        let configs = self.source.find_all_active().await?;

        let mut next = HashMap::with_capacity(configs.len());
        for config in configs {
            if config.geohash_prefix.chars().count() != HOT_ZONE_PREFIX_LEN {
                warn!(
                    prefix = %config.geohash_prefix,
                    expected_len = HOT_ZONE_PREFIX_LEN,
                    "Hot zone prefix has the wrong length and will never match"
                );
            }
            let prefix = config.geohash_prefix.clone();
            if next.insert(prefix.clone(), config).is_some() {
                return Err(Error::HotZone(format!(
                    "duplicate hot zone prefix: {}",
                    prefix
                )));
            }
        }

        let count = next.len();
        *self.zones.write() = Arc::new(next);
        *self.last_refreshed_at.write() = Some(Utc::now());

        info!(count, "Refreshed hot zone configs");
        Ok(count)
    }

    /// Zone owning `geohash`, matched on its first four characters.
    pub fn find_config(&self, geohash: &str) -> Option<HotZoneConfig> {
        let prefix = zone_prefix(geohash)?;
        self.zones.read().get(prefix).cloned()
    }

    pub fn is_hot_zone(&self, geohash: &str) -> bool {
        match zone_prefix(geohash) {
            Some(prefix) => self.zones.read().contains_key(prefix),
            None => false,
        }
    }

    /// Current map.
    pub fn snapshot(&self) -> Arc<ZoneMap> {
        self.zones.read().clone()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.read().len()
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        *self.last_refreshed_at.read()
    }

    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }
}

fn zone_prefix(geohash: &str) -> Option<&str> {
    geohash.get(..HOT_ZONE_PREFIX_LEN)
}
