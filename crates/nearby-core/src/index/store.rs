use super::partition::{IndexPartition, PartitionKind};
use crate::hotzone::HotZoneDirectory;
use crate::records::RecordId;
use crate::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Entry counts per partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexSizes {
    pub hot: usize,
    pub standard: usize,
}

impl IndexSizes {
    pub fn total(&self) -> usize {
        self.hot + self.standard
    }
}

/// Routes index operations to the HOT or STANDARD partition and keeps each
/// record id in at most one partition under one geohash.
///
/// Mutations hold the write side of a gate; lookups hold the read side, so
/// a reader never sees a record halfway through a partition move.
///
/// Routing uses the zones current at call time. A hot-zone refresh does not
/// migrate entries: a record indexed before its cell became (or stopped
/// being) hot stays in its old partition and is missed by prefix lookups
/// until its next mutation is synced.
pub struct SpatialIndexStore {
    hot: Arc<dyn IndexPartition>,
    standard: Arc<dyn IndexPartition>,
    directory: Arc<HotZoneDirectory>,
    write_gate: RwLock<()>,
}

impl SpatialIndexStore {
    pub fn new(
        hot: Arc<dyn IndexPartition>,
        standard: Arc<dyn IndexPartition>,
        directory: Arc<HotZoneDirectory>,
    ) -> Self {
        Self {
            hot,
            standard,
            directory,
            write_gate: RwLock::new(()),
        }
    }

    fn route(&self, geohash: &str) -> PartitionKind {
        if self.directory.is_hot_zone(geohash) {
            PartitionKind::Hot
        } else {
            PartitionKind::Standard
        }
    }

    fn partition(&self, kind: PartitionKind) -> &Arc<dyn IndexPartition> {
        match kind {
            PartitionKind::Hot => &self.hot,
            PartitionKind::Standard => &self.standard,
        }
    }

    /// Place `id` at `geohash` in the partition its zone selects.
    pub async fn upsert(&self, geohash: &str, id: RecordId) -> Result<PartitionKind> {
        let _gate = self.write_gate.write().await;

        let target_kind = self.route(geohash);
        let other_kind = match target_kind {
            PartitionKind::Hot => PartitionKind::Standard,
            PartitionKind::Standard => PartitionKind::Hot,
        };
        let target = self.partition(target_kind);

        if let Some(previous) = self.partition(other_kind).remove(id).await? {
            debug!(
                record_id = id,
                from = %other_kind,
                to = %target_kind,
                previous = %previous,
                "Moving index entry between partitions"
            );
        }

        match target.location_of(id).await? {
            Some(existing) if existing == geohash => {}
            Some(_) => {
                target.remove(id).await?;
            }
            None => {}
        }
        target.put(geohash, id).await?;

        debug!(record_id = id, geohash, partition = %target_kind, "Index entry upserted");
        Ok(target_kind)
    }

    /// Remove `id` from both partitions. Returns true if anything was removed.
    pub async fn delete_by_record_id(&self, id: RecordId) -> Result<bool> {
        let _gate = self.write_gate.write().await;

        let from_hot = self.hot.remove(id).await?.is_some();
        let from_standard = self.standard.remove(id).await?.is_some();
        if from_hot || from_standard {
            debug!(record_id = id, "Index entry deleted");
        }
        Ok(from_hot || from_standard)
    }

    /// Ids under `prefix`, read from the partition the prefix routes to.
    pub async fn find_ids_by_prefix(&self, prefix: &str) -> Result<Vec<RecordId>> {
        let _gate = self.write_gate.read().await;

        let ids = self.partition(self.route(prefix)).find_by_prefix(prefix).await?;
        let unique: BTreeSet<RecordId> = ids.into_iter().collect();
        Ok(unique.into_iter().collect())
    }

    /// Where `id` is currently indexed, if anywhere.
    pub async fn location_of(&self, id: RecordId) -> Result<Option<(PartitionKind, String)>> {
        let _gate = self.write_gate.read().await;

        for kind in [PartitionKind::Hot, PartitionKind::Standard] {
            if let Some(geohash) = self.partition(kind).location_of(id).await? {
                return Ok(Some((kind, geohash)));
            }
        }
        Ok(None)
    }

    pub async fn sizes(&self) -> Result<IndexSizes> {
        let _gate = self.write_gate.read().await;

        Ok(IndexSizes {
            hot: self.hot.len().await?,
            standard: self.standard.len().await?,
        })
    }

    pub fn directory(&self) -> &Arc<HotZoneDirectory> {
        &self.directory
    }
}
