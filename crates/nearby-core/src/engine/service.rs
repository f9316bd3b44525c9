use crate::cache::{GeoCellCache, RecordCache};
use crate::changelog::{ChangeLog, InMemoryChangeLog, JournalChangeLog};
use crate::config::Config;
use crate::health::{Component, ComponentStatus, HealthCheck};
use crate::hotzone::{FileHotZoneSource, HotZoneDirectory, HotZoneSource, StaticHotZoneSource};
use crate::index::{InMemoryPartition, IndexPartition, IndexSizes, PartitionKind, SpatialIndexStore};
use crate::metrics::ProximityMetrics;
use crate::records::{InMemoryRecordStore, RecordService, RecordStore};
use crate::search::{NearbyQuery, NearbySearchResponse, SearchEngine};
use crate::sync::{Backlog, IndexSynchronizer, SyncScheduler};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builder for [`ProximityService`].
///
/// Every backend defaults to its in-memory implementation. When the config
/// names a journal path or a hot-zone file, those are used unless a backend
/// was injected explicitly.
pub struct ProximityServiceBuilder {
    config: Config,
    record_store: Option<Arc<dyn RecordStore>>,
    change_log: Option<Arc<dyn ChangeLog>>,
    hot_zone_source: Option<Arc<dyn HotZoneSource>>,
    partitions: Option<(Arc<dyn IndexPartition>, Arc<dyn IndexPartition>)>,
}

impl ProximityServiceBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            record_store: None,
            change_log: None,
            hot_zone_source: None,
            partitions: None,
        }
    }

    pub fn with_record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    pub fn with_change_log(mut self, change_log: Arc<dyn ChangeLog>) -> Self {
        self.change_log = Some(change_log);
        self
    }

    pub fn with_hot_zone_source(mut self, source: Arc<dyn HotZoneSource>) -> Self {
        self.hot_zone_source = Some(source);
        self
    }

    /// Use custom HOT and STANDARD partitions.
    pub fn with_partitions(
        mut self,
        hot: Arc<dyn IndexPartition>,
        standard: Arc<dyn IndexPartition>,
    ) -> Self {
        self.partitions = Some((hot, standard));
        self
    }

    /// Build the service. Loads hot zones once before returning.
    pub async fn build(self) -> Result<ProximityService> {
        let config = self.config;
        config.validate()?;

        // Change log first: a journal replay failure should stop startup
        let mut journal = None;
        let change_log: Arc<dyn ChangeLog> =
            match (self.change_log, &config.change_log.journal_path) {
                (Some(change_log), _) => change_log,
                (None, Some(path)) => {
                    let opened = Arc::new(JournalChangeLog::open(path)?);
                    journal = Some(Arc::clone(&opened));
                    opened
                }
                (None, None) => Arc::new(InMemoryChangeLog::new()),
            };

        let record_store = self
            .record_store
            .unwrap_or_else(|| Arc::new(InMemoryRecordStore::new()));

        let hot_zone_source: Arc<dyn HotZoneSource> =
            match (self.hot_zone_source, &config.hot_zones.source_path) {
                (Some(source), _) => source,
                (None, Some(path)) => Arc::new(FileHotZoneSource::new(path.clone())),
                (None, None) => Arc::new(StaticHotZoneSource::new(config.hot_zones.zones.clone())),
            };

        let metrics = Arc::new(ProximityMetrics::new()?);
        let health = Arc::new(HealthCheck::new());
        for component in Component::ALL {
            health.register_component(component);
        }

        let directory = Arc::new(HotZoneDirectory::new(hot_zone_source));
        match directory.refresh().await {
            Ok(count) => {
                metrics.set_hot_zone_count(count);
                health.mark_healthy(Component::HotZones);
            }
            Err(e) => {
                // every record routes to STANDARD until a refresh succeeds
                warn!(error = %e, "Initial hot zone load failed");
                metrics.record_hot_zone_refresh_failure();
                health.mark_degraded(Component::HotZones, &e.to_string());
            }
        }

        let (hot, standard) = self.partitions.unwrap_or_else(|| {
            (
                Arc::new(InMemoryPartition::new(PartitionKind::Hot)) as Arc<dyn IndexPartition>,
                Arc::new(InMemoryPartition::new(PartitionKind::Standard)) as Arc<dyn IndexPartition>,
            )
        });
        let index = Arc::new(SpatialIndexStore::new(hot, standard, Arc::clone(&directory)));

        let record_cache = Arc::new(RecordCache::new(config.cache.record_ttl()));
        let geo_cache = Arc::new(GeoCellCache::new(config.cache.geo_cell_ttl()));

        let records = Arc::new(RecordService::new(
            Arc::clone(&record_store),
            Arc::clone(&change_log),
            Arc::clone(&record_cache),
        ));
        let synchronizer = Arc::new(IndexSynchronizer::new(
            Arc::clone(&change_log),
            record_store,
            Arc::clone(&index),
            Arc::clone(&geo_cache),
            Arc::clone(&metrics),
        ));
        let search = Arc::new(SearchEngine::new(
            config.search.clone(),
            Arc::clone(&index),
            Arc::clone(&records),
            Arc::clone(&geo_cache),
            Arc::clone(&metrics),
        ));
        let scheduler = Arc::new(SyncScheduler::new(
            config.index_sync.clone(),
            config.hot_zones.refresh_interval(),
            Arc::clone(&synchronizer),
            Arc::clone(&directory),
            Arc::clone(&health),
            Arc::clone(&metrics),
        ));

        let service = ProximityService {
            config,
            records,
            change_log,
            journal,
            search,
            synchronizer,
            scheduler,
            index,
            directory,
            record_cache,
            geo_cache,
            health,
            metrics,
        };
        service.refresh_health().await;

        info!(
            hot_zones = service.directory.zone_count(),
            journal = service.journal.is_some(),
            sync_enabled = service.config.index_sync.enabled,
            "Proximity service initialized"
        );
        Ok(service)
    }
}

/// Status of one component, as reported by [`ProximityService::status`].
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub component: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Point-in-time service summary.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub sync_loop_running: bool,
    pub components: Vec<ComponentReport>,
    pub index: IndexSizes,
    pub backlog: Backlog,
    pub hot_zones: usize,
    pub hot_zone_refresh_failures: u64,
    pub record_cache_entries: usize,
    pub geo_cell_cache_entries: usize,
}

/// The assembled proximity service.
pub struct ProximityService {
    config: Config,
    records: Arc<RecordService>,
    change_log: Arc<dyn ChangeLog>,
    /// Set when the change log is the built-in journal
    journal: Option<Arc<JournalChangeLog>>,
    search: Arc<SearchEngine>,
    synchronizer: Arc<IndexSynchronizer>,
    scheduler: Arc<SyncScheduler>,
    index: Arc<SpatialIndexStore>,
    directory: Arc<HotZoneDirectory>,
    record_cache: Arc<RecordCache>,
    geo_cache: Arc<GeoCellCache>,
    health: Arc<HealthCheck>,
    metrics: Arc<ProximityMetrics>,
}

impl ProximityService {
    /// Build with in-memory backends.
    pub async fn new(config: Config) -> Result<Self> {
        ProximityServiceBuilder::new(config).build().await
    }

    /// Start background tasks.
    pub async fn start(&self) {
        Arc::clone(&self.scheduler).start().await;
    }

    /// Stop background tasks and flush the journal.
    pub async fn stop(&self) -> Result<()> {
        self.scheduler.stop().await;
        if let Some(journal) = &self.journal {
            journal.sync()?;
        }
        info!("Proximity service stopped");
        Ok(())
    }

    /// Radius search. Failures are counted by error type.
    pub async fn search_nearby(&self, query: &NearbyQuery) -> Result<NearbySearchResponse> {
        self.search.search_nearby(query).await.map_err(|e| {
            self.metrics.record_error(&e);
            e
        })
    }

    /// Apply one sync batch now, outside the schedule.
    pub async fn sync_once(&self, max_events: usize) -> Result<usize> {
        match self.scheduler.trigger_sync(max_events).await {
            Ok(processed) => {
                self.health.mark_healthy(Component::IndexSync);
                Ok(processed)
            }
            Err(e) => {
                self.metrics.record_error(&e);
                self.health
                    .mark_degraded(Component::IndexSync, &e.to_string());
                Err(e)
            }
        }
    }

    /// Check each backend and update component health.
    pub async fn refresh_health(&self) {
        match self.records.store().count().await {
            Ok(count) => {
                debug!(records = count, "Record store reachable");
                self.health.mark_healthy(Component::RecordStore);
            }
            Err(e) => self
                .health
                .mark_unhealthy(Component::RecordStore, &e.to_string()),
        }

        match self.synchronizer.backlog().await {
            Ok(_) => self.health.mark_healthy(Component::ChangeLog),
            Err(e) => self
                .health
                .mark_unhealthy(Component::ChangeLog, &e.to_string()),
        }

        match self.index.sizes().await {
            Ok(_) => self.health.mark_healthy(Component::SpatialIndex),
            Err(e) => self
                .health
                .mark_unhealthy(Component::SpatialIndex, &e.to_string()),
        }
    }

    /// Health, index and backlog summary.
    pub async fn status(&self) -> Result<ServiceStatus> {
        let mut components: Vec<_> = self.health.get_all_statuses().into_iter().collect();
        components.sort_by_key(|(component, _)| *component);
        let components = components
            .into_iter()
            .map(|(component, status)| ComponentReport {
                component: component.as_str(),
                status: status.label(),
                reason: status.reason().map(str::to_string),
            })
            .collect();

        Ok(ServiceStatus {
            status: self.health.overall_status().as_str(),
            uptime_seconds: self.health.uptime().as_secs(),
            sync_loop_running: self.health.is_sync_loop_running(),
            components,
            index: self.index.sizes().await?,
            backlog: self.synchronizer.backlog().await?,
            hot_zones: self.directory.zone_count(),
            hot_zone_refresh_failures: self.directory.refresh_failures(),
            record_cache_entries: self.record_cache.len(),
            geo_cell_cache_entries: self.geo_cache.len(),
        })
    }

    /// Ready to take traffic: operational and the record store answers.
    pub async fn is_ready(&self) -> bool {
        self.health.is_operational()
            && !matches!(
                self.health.get_component_status(Component::RecordStore),
                Some(ComponentStatus::Unhealthy(_))
            )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn records(&self) -> &Arc<RecordService> {
        &self.records
    }

    pub fn change_log(&self) -> &Arc<dyn ChangeLog> {
        &self.change_log
    }

    pub fn search(&self) -> &Arc<SearchEngine> {
        &self.search
    }

    pub fn synchronizer(&self) -> &Arc<IndexSynchronizer> {
        &self.synchronizer
    }

    pub fn scheduler(&self) -> &Arc<SyncScheduler> {
        &self.scheduler
    }

    pub fn index(&self) -> &Arc<SpatialIndexStore> {
        &self.index
    }

    pub fn hot_zones(&self) -> &Arc<HotZoneDirectory> {
        &self.directory
    }

    pub fn health(&self) -> &Arc<HealthCheck> {
        &self.health
    }

    pub fn metrics(&self) -> &Arc<ProximityMetrics> {
        &self.metrics
    }
}
