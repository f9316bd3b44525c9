use crate::records::RecordId;
use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Which shard an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionKind {
    Hot,
    Standard,
}

impl PartitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::Hot => "hot",
            PartitionKind::Standard => "standard",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One index shard.
///
/// A partition alone only guarantees one geohash per id within itself;
/// cross-partition uniqueness is the store's job.
#[async_trait]
pub trait IndexPartition: Send + Sync {
    fn kind(&self) -> PartitionKind;

    /// Insert `(geohash, id)`, replacing any entry this partition holds for `id`.
    async fn put(&self, geohash: &str, id: RecordId) -> Result<()>;

    /// Remove the entry for `id`, returning its geohash if there was one.
    async fn remove(&self, id: RecordId) -> Result<Option<String>>;

    async fn location_of(&self, id: RecordId) -> Result<Option<String>>;

    /// Ids whose geohash starts with `prefix`.
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<RecordId>>;

    async fn len(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct PartitionState {
    by_geohash: BTreeMap<String, BTreeSet<RecordId>>,
    by_id: HashMap<RecordId, String>,
}

impl PartitionState {
    fn detach(&mut self, id: RecordId) -> Option<String> {
        let geohash = self.by_id.remove(&id)?;
        if let Some(ids) = self.by_geohash.get_mut(&geohash) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_geohash.remove(&geohash);
            }
        }
        Some(geohash)
    }
}

/// Ordered in-memory shard; prefix lookups are range scans.
#[derive(Debug)]
pub struct InMemoryPartition {
    kind: PartitionKind,
    state: RwLock<PartitionState>,
}

impl InMemoryPartition {
    pub fn new(kind: PartitionKind) -> Self {
        Self {
            kind,
            state: RwLock::new(PartitionState::default()),
        }
    }
}

#[async_trait]
impl IndexPartition for InMemoryPartition {
    fn kind(&self) -> PartitionKind {
        self.kind
    }

    async fn put(&self, geohash: &str, id: RecordId) -> Result<()> {
        let mut state = self.state.write();
        if state.by_id.get(&id).map(String::as_str) == Some(geohash) {
            return Ok(());
        }
        state.detach(id);
        state.by_id.insert(id, geohash.to_string());
        state
            .by_geohash
            .entry(geohash.to_string())
            .or_default()
            .insert(id);
        Ok(())
    }

    async fn remove(&self, id: RecordId) -> Result<Option<String>> {
        Ok(self.state.write().detach(id))
    }

    async fn location_of(&self, id: RecordId) -> Result<Option<String>> {
        Ok(self.state.read().by_id.get(&id).cloned())
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<RecordId>> {
        let state = self.state.read();
        Ok(state
            .by_geohash
            .range(prefix.to_string()..)
            .take_while(|(geohash, _)| geohash.starts_with(prefix))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().by_id.len())
    }
}
