//! Prometheus metrics export.

use crate::{Error, Result};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Prefix shared by every exported metric name.
pub const METRIC_PREFIX: &str = "nearby";

/// Latency buckets in seconds for search requests.
const SEARCH_LATENCY_BUCKETS: [f64; 9] = [0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0];

/// Latency buckets in seconds for sync batches.
const SYNC_LATENCY_BUCKETS: [f64; 8] = [0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0];

/// Buckets for per-search candidate and result counts.
const COUNT_BUCKETS: [f64; 8] = [0.0, 1.0, 5.0, 20.0, 100.0, 500.0, 2000.0, 10000.0];

/// Error categories for labeled metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Validation,
    NotFound,
    Index,
    ChangeLog,
    RecordStore,
    HotZone,
    Other,
}

impl ErrorType {
    /// Get the label value for Prometheus export.
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorType::Validation => "validation",
            ErrorType::NotFound => "not_found",
            ErrorType::Index => "index",
            ErrorType::ChangeLog => "change_log",
            ErrorType::RecordStore => "record_store",
            ErrorType::HotZone => "hot_zone",
            ErrorType::Other => "other",
        }
    }
}

impl From<&Error> for ErrorType {
    fn from(err: &Error) -> Self {
        match err {
            Error::Validation(_) => ErrorType::Validation,
            Error::NotFound(_) => ErrorType::NotFound,
            Error::Index(_) => ErrorType::Index,
            Error::ChangeLog(_) => ErrorType::ChangeLog,
            Error::RecordStore(_) => ErrorType::RecordStore,
            Error::HotZone(_) => ErrorType::HotZone,
            _ => ErrorType::Other,
        }
    }
}

/// Search, cache and index-sync metrics registered on a private registry.
pub struct ProximityMetrics {
    registry: Registry,

    // === SEARCH ===
    search_latency: Histogram,
    search_candidates: Histogram,
    search_results: Histogram,
    geo_cache_hits: IntCounter,
    geo_cache_misses: IntCounter,

    // === INDEX SYNC ===
    sync_latency: Histogram,
    sync_processed_events: IntCounter,
    sync_failures: IntCounter,
    sync_backlog: IntGauge,
    sync_oldest_age_seconds: IntGauge,

    // === HOT ZONES ===
    hot_zone_count: IntGauge,
    hot_zone_refresh_failures: IntCounter,

    // === ERRORS ===
    errors: IntCounterVec,
}

impl ProximityMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let metrics = Self {
            search_latency: histogram(
                "search_latency_seconds",
                "Latency of nearby search requests",
                &SEARCH_LATENCY_BUCKETS,
            )?,
            search_candidates: histogram(
                "search_candidates",
                "Candidate ids gathered per search before distance filtering",
                &COUNT_BUCKETS,
            )?,
            search_results: histogram(
                "search_results",
                "Matches within radius per search",
                &COUNT_BUCKETS,
            )?,
            geo_cache_hits: counter("geo_cache_hits_total", "Geo-cell cache hits")?,
            geo_cache_misses: counter("geo_cache_misses_total", "Geo-cell cache misses")?,
            sync_latency: histogram(
                "index_sync_latency_seconds",
                "Duration of one index-sync batch",
                &SYNC_LATENCY_BUCKETS,
            )?,
            sync_processed_events: counter(
                "index_sync_processed_events_total",
                "Change events applied to the index",
            )?,
            sync_failures: counter("index_sync_failures_total", "Failed index-sync batches")?,
            sync_backlog: gauge("index_sync_backlog", "Unprocessed change events")?,
            sync_oldest_age_seconds: gauge(
                "index_sync_oldest_age_seconds",
                "Age of the oldest unprocessed change event",
            )?,
            hot_zone_count: gauge("hot_zones", "Active hot zones")?,
            hot_zone_refresh_failures: counter(
                "hot_zone_refresh_failures_total",
                "Failed hot-zone refreshes",
            )?,
            errors: IntCounterVec::new(
                Opts::new(metric_name("errors_total"), "Errors by type"),
                &["type"],
            )?,
            registry,
        };
        metrics.register_all()?;
        Ok(metrics)
    }

    fn register_all(&self) -> Result<()> {
        for histogram in [
            &self.search_latency,
            &self.search_candidates,
            &self.search_results,
            &self.sync_latency,
        ] {
            self.registry.register(Box::new(histogram.clone()))?;
        }
        for counter in [
            &self.geo_cache_hits,
            &self.geo_cache_misses,
            &self.sync_processed_events,
            &self.sync_failures,
            &self.hot_zone_refresh_failures,
        ] {
            self.registry.register(Box::new(counter.clone()))?;
        }
        for gauge in [
            &self.sync_backlog,
            &self.sync_oldest_age_seconds,
            &self.hot_zone_count,
        ] {
            self.registry.register(Box::new(gauge.clone()))?;
        }
        self.registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }

    // === RECORDING ===

    /// Record one completed search.
    pub fn record_search(&self, duration: Duration, candidates: usize, results: usize) {
        self.search_latency.observe(duration.as_secs_f64());
        self.search_candidates.observe(candidates as f64);
        self.search_results.observe(results as f64);
    }

    pub fn record_geo_cache_hit(&self) {
        self.geo_cache_hits.inc();
    }

    pub fn record_geo_cache_miss(&self) {
        self.geo_cache_misses.inc();
    }

    /// Record a successful sync batch (including empty ones).
    pub fn record_sync(&self, duration: Duration, processed: usize) {
        self.sync_latency.observe(duration.as_secs_f64());
        self.sync_processed_events.inc_by(processed as u64);
    }

    /// Record a failed sync batch.
    pub fn record_sync_failure(&self, duration: Duration) {
        self.sync_latency.observe(duration.as_secs_f64());
        self.sync_failures.inc();
    }

    /// Update backlog gauges.
    pub fn set_backlog(&self, unprocessed: u64, oldest_age: Duration) {
        self.sync_backlog.set(unprocessed as i64);
        self.sync_oldest_age_seconds.set(oldest_age.as_secs() as i64);
    }

    pub fn set_hot_zone_count(&self, count: usize) {
        self.hot_zone_count.set(count as i64);
    }

    pub fn record_hot_zone_refresh_failure(&self) {
        self.hot_zone_refresh_failures.inc();
    }

    /// Record an error with its category label.
    pub fn record_error(&self, err: &Error) {
        self.errors
            .with_label_values(&[ErrorType::from(err).as_label()])
            .inc();
    }

    // === GETTERS ===

    pub fn searches_total(&self) -> u64 {
        self.search_latency.get_sample_count()
    }

    pub fn geo_cache_hits(&self) -> u64 {
        self.geo_cache_hits.get()
    }

    pub fn geo_cache_misses(&self) -> u64 {
        self.geo_cache_misses.get()
    }

    pub fn sync_batches_total(&self) -> u64 {
        self.sync_latency.get_sample_count()
    }

    pub fn sync_processed_events(&self) -> u64 {
        self.sync_processed_events.get()
    }

    pub fn sync_failures(&self) -> u64 {
        self.sync_failures.get()
    }

    pub fn sync_backlog(&self) -> i64 {
        self.sync_backlog.get()
    }

    pub fn sync_oldest_age_seconds(&self) -> i64 {
        self.sync_oldest_age_seconds.get()
    }

    pub fn hot_zone_count(&self) -> i64 {
        self.hot_zone_count.get()
    }

    pub fn errors_by_type(&self, error_type: ErrorType) -> u64 {
        self.errors
            .with_label_values(&[error_type.as_label()])
            .get()
    }

    /// Export all metrics in Prometheus text format.
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::with_capacity(4096);
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn metric_name(name: &str) -> String {
    format!("{}_{}", METRIC_PREFIX, name)
}

fn counter(name: &str, help: &str) -> Result<IntCounter> {
    Ok(IntCounter::new(metric_name(name), help)?)
}

fn gauge(name: &str, help: &str) -> Result<IntGauge> {
    Ok(IntGauge::new(metric_name(name), help)?)
}

fn histogram(name: &str, help: &str, buckets: &[f64]) -> Result<Histogram> {
    let opts = HistogramOpts::new(metric_name(name), help).buckets(buckets.to_vec());
    Ok(Histogram::with_opts(opts)?)
}
