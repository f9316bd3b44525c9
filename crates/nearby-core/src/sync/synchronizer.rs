use crate::cache::GeoCellCache;
use crate::changelog::{ChangeEvent, ChangeKind, ChangeLog};
use crate::index::SpatialIndexStore;
use crate::metrics::ProximityMetrics;
use crate::records::RecordStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Unprocessed change-log state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backlog {
    pub unprocessed: u64,
    pub oldest_created_at: Option<DateTime<Utc>>,
    /// Zero when the backlog is empty
    #[serde(rename = "oldest_age_seconds", serialize_with = "as_seconds")]
    pub oldest_age: Duration,
}

fn as_seconds<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

/// Applies change events to the spatial index.
pub struct IndexSynchronizer {
    change_log: Arc<dyn ChangeLog>,
    records: Arc<dyn RecordStore>,
    index: Arc<SpatialIndexStore>,
    geo_cache: Arc<GeoCellCache>,
    metrics: Arc<ProximityMetrics>,
    /// Held for the whole batch; one batch at a time
    in_flight: Mutex<()>,
}

impl IndexSynchronizer {
    pub fn new(
        change_log: Arc<dyn ChangeLog>,
        records: Arc<dyn RecordStore>,
        index: Arc<SpatialIndexStore>,
        geo_cache: Arc<GeoCellCache>,
        metrics: Arc<ProximityMetrics>,
    ) -> Self {
        Self {
            change_log,
            records,
            index,
            geo_cache,
            metrics,
            in_flight: Mutex::new(()),
        }
    }

    /// Apply up to `max_events` unprocessed events in id order.
    ///
    /// Returns the number of events processed. On error nothing is marked
    /// processed and the geo-cell cache is left alone; already-applied index
    /// writes are idempotent and get replayed by the next batch.
    pub async fn sync_once(&self, max_events: usize) -> Result<usize> {
        let _batch = self.in_flight.lock().await;
        let start = Instant::now();

        let result = self.run_batch(max_events).await;
        let elapsed = start.elapsed();
        match &result {
            Ok(processed) => self.metrics.record_sync(elapsed, *processed),
            Err(e) => {
                self.metrics.record_sync_failure(elapsed);
                warn!(error = %e, duration_ms = elapsed.as_millis() as u64, "Index sync batch failed");
            }
        }
        result
    }

    async fn run_batch(&self, max_events: usize) -> Result<usize> {
        let events = self.change_log.poll_unprocessed(max_events).await?;
        if events.is_empty() {
            debug!("No unprocessed change events");
            return Ok(0);
        }

        for event in &events {
            self.apply_event(event).await?;
        }

        let ids: Vec<_> = events.iter().map(|e| e.id).collect();
        self.change_log.mark_processed(&ids).await?;
        self.geo_cache.clear();

        info!(
            processed = ids.len(),
            first_event = ids[0],
            last_event = ids[ids.len() - 1],
            "Index sync batch applied"
        );
        Ok(ids.len())
    }

    async fn apply_event(&self, event: &ChangeEvent) -> Result<()> {
        if event.kind == ChangeKind::Deleted {
            self.index.delete_by_record_id(event.record_id).await?;
            return Ok(());
        }

        // the record may have changed again since the event; index its current state
        match self.records.find_by_id(event.record_id).await? {
            Some(record) if record.is_active() => {
                self.index.upsert(&record.geohash, record.id).await?;
            }
            _ => {
                self.index.delete_by_record_id(event.record_id).await?;
            }
        }
        Ok(())
    }

    /// Current backlog; also refreshes the backlog gauges.
    pub async fn backlog(&self) -> Result<Backlog> {
        let unprocessed = self.change_log.count_unprocessed().await?;
        let oldest_created_at = self.change_log.oldest_unprocessed_created_at().await?;
        let oldest_age = oldest_created_at
            .and_then(|created| (Utc::now() - created).to_std().ok())
            .unwrap_or(Duration::ZERO);

        self.metrics.set_backlog(unprocessed, oldest_age);
        Ok(Backlog {
            unprocessed,
            oldest_created_at,
            oldest_age,
        })
    }
}
