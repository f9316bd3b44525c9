use super::HotZoneConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provider of hot-zone configurations.
#[async_trait]
pub trait HotZoneSource: Send + Sync {
    /// All currently active zones.
    async fn find_all_active(&self) -> Result<Vec<HotZoneConfig>>;
}

/// Fixed list, typically from `[[hot_zones.zones]]` in the main config.
#[derive(Debug, Clone, Default)]
pub struct StaticHotZoneSource {
    zones: Vec<HotZoneConfig>,
}

impl StaticHotZoneSource {
    pub fn new(zones: Vec<HotZoneConfig>) -> Self {
        Self { zones }
    }
}

#[async_trait]
impl HotZoneSource for StaticHotZoneSource {
    async fn find_all_active(&self) -> Result<Vec<HotZoneConfig>> {
        Ok(self.zones.iter().filter(|z| z.active).cloned().collect())
    }
}

#[derive(Debug, Deserialize)]
struct ZonesFile {
    #[serde(default)]
    zones: Vec<HotZoneConfig>,
}

/// TOML file of `[[zones]]` tables, re-read on every call so edits are
/// picked up by the next refresh.
#[derive(Debug, Clone)]
pub struct FileHotZoneSource {
    path: PathBuf,
}

impl FileHotZoneSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HotZoneSource for FileHotZoneSource {
    async fn find_all_active(&self) -> Result<Vec<HotZoneConfig>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::HotZone(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let file: ZonesFile = toml::from_str(&content).map_err(|e| {
            Error::HotZone(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), zones = file.zones.len(), "Hot zone file loaded");
        Ok(file.zones.into_iter().filter(|z| z.active).collect())
    }
}
