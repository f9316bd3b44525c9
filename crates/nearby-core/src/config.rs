//! Configuration structures for the proximity service.
//!
//! Configuration is loaded from a TOML file. Every section is optional and
//! falls back to its defaults; CLI flags override the log level.

use crate::hotzone::HotZoneConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Search limits and defaults
    #[serde(default)]
    pub search: SearchConfig,

    /// Cache TTLs
    #[serde(default)]
    pub cache: CacheConfig,

    /// Background index synchronization
    #[serde(default)]
    pub index_sync: IndexSyncConfig,

    /// Hot zone routing
    #[serde(default)]
    pub hot_zones: HotZonesConfig,

    /// Change log persistence
    #[serde(default)]
    pub change_log: ChangeLogConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// HTTP API server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SearchConfig {
    /// Page size when the caller gives none
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Largest accepted page size
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,

    /// Radius when the caller gives none, in meters
    #[serde(default = "default_radius_m")]
    pub default_radius_m: u32,

    #[serde(default = "default_min_radius_m")]
    pub min_radius_m: u32,

    #[serde(default = "default_max_radius_m")]
    pub max_radius_m: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_radius_m: default_radius_m(),
            min_radius_m: default_min_radius_m(),
            max_radius_m: default_max_radius_m(),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Record cache TTL
    #[serde(default = "default_record_ttl_seconds")]
    pub record_ttl_seconds: u64,

    /// Geo-cell candidate cache TTL
    #[serde(default = "default_geo_cell_ttl_seconds")]
    pub geo_cell_ttl_seconds: u64,
}

impl CacheConfig {
    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_seconds)
    }

    pub fn geo_cell_ttl(&self) -> Duration {
        Duration::from_secs(self.geo_cell_ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            record_ttl_seconds: default_record_ttl_seconds(),
            geo_cell_ttl_seconds: default_geo_cell_ttl_seconds(),
        }
    }
}

/// Index synchronizer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexSyncConfig {
    /// Run the background sync loop
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Delay between the end of one batch and the start of the next
    #[serde(default = "default_sync_delay_ms")]
    pub delay_ms: u64,

    /// Maximum events per batch
    #[serde(default = "default_sync_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexSyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            delay_ms: default_sync_delay_ms(),
            batch_size: default_sync_batch_size(),
        }
    }
}

/// Hot zone configuration.
///
/// Zones come from `source_path` when set (re-read on every refresh),
/// otherwise from the inline `zones` list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotZonesConfig {
    #[serde(default = "default_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,

    /// TOML file with `[[zones]]` entries
    #[serde(default)]
    pub source_path: Option<PathBuf>,

    #[serde(default)]
    pub zones: Vec<HotZoneConfig>,
}

impl HotZonesConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

impl Default for HotZonesConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval_seconds(),
            source_path: None,
            zones: Vec::new(),
        }
    }
}

/// Change log configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChangeLogConfig {
    /// Journal file; the change log is in-memory when unset
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Metrics HTTP port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    /// Default
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_limit() -> u32 {
    20
}
fn default_max_limit() -> u32 {
    100
}
fn default_radius_m() -> u32 {
    5_000
}
fn default_min_radius_m() -> u32 {
    100
}
fn default_max_radius_m() -> u32 {
    50_000
}
fn default_record_ttl_seconds() -> u64 {
    3600 // 1 hour
}
fn default_geo_cell_ttl_seconds() -> u64 {
    300 // 5 minutes
}
fn default_enabled() -> bool {
    true
}
fn default_sync_delay_ms() -> u64 {
    30_000
}
fn default_sync_batch_size() -> usize {
    500
}
fn default_refresh_interval_seconds() -> u64 {
    60
}
fn default_metrics_port() -> u16 {
    9090
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        let search = &self.search;
        if search.max_limit == 0 {
            return Err(crate::Error::Config("search.max_limit must be > 0".into()));
        }
        if search.default_limit == 0 || search.default_limit > search.max_limit {
            return Err(crate::Error::Config(format!(
                "search.default_limit must be between 1 and {}",
                search.max_limit
            )));
        }
        if search.min_radius_m == 0 || search.min_radius_m > search.max_radius_m {
            return Err(crate::Error::Config(
                "search.min_radius_m must be > 0 and <= search.max_radius_m".into(),
            ));
        }
        if search.default_radius_m < search.min_radius_m
            || search.default_radius_m > search.max_radius_m
        {
            return Err(crate::Error::Config(
                "search.default_radius_m must lie within the radius bounds".into(),
            ));
        }

        if self.cache.record_ttl_seconds == 0 || self.cache.geo_cell_ttl_seconds == 0 {
            return Err(crate::Error::Config("cache TTLs must be > 0".into()));
        }

        if self.index_sync.batch_size == 0 {
            return Err(crate::Error::Config(
                "index_sync.batch_size must be > 0".into(),
            ));
        }

        if self.hot_zones.refresh_interval_seconds == 0 {
            return Err(crate::Error::Config(
                "hot_zones.refresh_interval_seconds must be > 0".into(),
            ));
        }

        if self.server.port == self.monitoring.metrics_port {
            return Err(crate::Error::Config(format!(
                "server.port and monitoring.metrics_port must differ (both {})",
                self.server.port
            )));
        }

        if self.index_sync.delay_ms < 1_000 && self.index_sync.enabled {
            tracing::warn!(
                delay_ms = self.index_sync.delay_ms,
                "Very short index sync delay keeps the change log hot"
            );
        }

        Ok(())
    }
}
