use super::record::{NewRecord, Record, RecordId, RecordStatus};
use super::store::RecordStore;
use crate::cache::RecordCache;
use crate::changelog::{ChangeKind, ChangeLog};
use crate::geo::{encode, STORAGE_PRECISION};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum ids per store round-trip when hydrating cache misses.
pub const FETCH_BATCH_SIZE: usize = 1000;

/// Record CRUD plus cached active-record lookups.
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    change_log: Arc<dyn ChangeLog>,
    cache: Arc<RecordCache>,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        change_log: Arc<dyn ChangeLog>,
        cache: Arc<RecordCache>,
    ) -> Self {
        Self {
            store,
            change_log,
            cache,
        }
    }

    /// Create an active record and queue it for indexing.
    pub async fn create(&self, input: NewRecord) -> Result<Record> {
        input.validate()?;

        let id = self.store.next_id().await?;
        let record = Record::from_new(id, input, Utc::now());
        self.store.save(record.clone()).await?;
        self.change_log.append(id, ChangeKind::Created).await?;
        self.cache.evict(id);

        info!(record_id = id, geohash = %record.geohash, "Record created");
        Ok(record)
    }

    /// Replace the fields of an active record.
    pub async fn update(&self, id: RecordId, input: NewRecord) -> Result<Record> {
        input.validate()?;
        let existing = self.require_active(id).await?;

        let updated = Record {
            id,
            owner_id: input.owner_id,
            name: input.name,
            category: input.category,
            phone: input.phone,
            address: input.address,
            latitude: input.latitude,
            longitude: input.longitude,
            geohash: encode(input.latitude, input.longitude, STORAGE_PRECISION),
            status: RecordStatus::Active,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        self.store.save(updated.clone()).await?;
        self.change_log.append(id, ChangeKind::Updated).await?;
        self.cache.evict(id);

        info!(
            record_id = id,
            from = %existing.geohash,
            to = %updated.geohash,
            "Record updated"
        );
        Ok(updated)
    }

    /// Soft-delete an active record.
    pub async fn delete(&self, id: RecordId) -> Result<()> {
        let existing = self.require_active(id).await?;

        let deleted = Record {
            status: RecordStatus::Deleted,
            updated_at: Utc::now(),
            ..existing
        };
        self.store.save(deleted).await?;
        self.change_log.append(id, ChangeKind::Deleted).await?;
        self.cache.evict(id);

        info!(record_id = id, "Record deleted");
        Ok(())
    }

    /// Active record by id; `NotFound` when absent or deleted.
    pub async fn get(&self, id: RecordId) -> Result<Record> {
        self.require_active(id).await
    }

    /// Active record by id, cache first.
    pub async fn find_active_by_id(&self, id: RecordId) -> Result<Option<Record>> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(Some(cached).filter(Record::is_active));
        }

        let generation = self.cache.generation(id);
        let found = self
            .store
            .find_by_id(id)
            .await?
            .filter(Record::is_active);
        if let Some(record) = &found {
            self.cache.put_if_current(record.clone(), generation);
        }
        Ok(found)
    }

    /// Active records for `ids`, in no particular order.
    ///
    /// Cache hits are served directly; misses are fetched from the store in
    /// batches of [`FETCH_BATCH_SIZE`] and cached unless a mutation evicted
    /// them while the fetch was in flight.
    pub async fn find_active_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = Vec::with_capacity(ids.len());
        let mut misses = Vec::new();
        for &id in ids {
            match self.cache.get(id) {
                Some(record) if record.is_active() => result.push(record),
                Some(_) => {}
                None => misses.push(id),
            }
        }

        let hits = result.len();
        for batch in misses.chunks(FETCH_BATCH_SIZE) {
            let generations: HashMap<RecordId, u64> = batch
                .iter()
                .map(|&id| (id, self.cache.generation(id)))
                .collect();
            for record in self.store.find_all_by_ids(batch).await? {
                if record.is_active() {
                    if let Some(&generation) = generations.get(&record.id) {
                        self.cache.put_if_current(record.clone(), generation);
                    }
                    result.push(record);
                }
            }
        }

        debug!(
            requested = ids.len(),
            cache_hits = hits,
            fetched = result.len() - hits,
            "Hydrated records"
        );
        Ok(result)
    }

    async fn require_active(&self, id: RecordId) -> Result<Record> {
        self.find_active_by_id(id)
            .await?
            .ok_or(Error::NotFound(id))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}
