//! Record store abstraction.

use super::record::{Record, RecordId};
use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source-of-truth storage for records.
///
/// Implementations must tolerate concurrent callers; the synchronizer reads
/// while request handlers write.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up one record by id, whatever its status.
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>>;

    /// Look up several records. Missing ids are dropped; order is unspecified.
    async fn find_all_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>>;

    /// Reserve the next record id.
    async fn next_id(&self) -> Result<RecordId>;

    /// Insert or replace a record.
    async fn save(&self, record: Record) -> Result<()>;

    /// Number of stored records (any status).
    async fn count(&self) -> Result<usize>;
}

/// Process-local record store.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    records: DashMap<RecordId, Record>,
    sequence: AtomicI64,
}

impl InMemoryRecordStore {
    /// Create an empty store; ids start at 1.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            sequence: AtomicI64::new(0),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn find_all_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.value().clone()))
            .collect())
    }

    async fn next_id(&self) -> Result<RecordId> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn save(&self, record: Record) -> Result<()> {
        self.records.insert(record.id, record);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}
