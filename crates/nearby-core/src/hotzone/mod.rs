//! Hot-zone directory.
//!
//! A hot zone is a 4-character geohash prefix whose index entries live in
//! the dedicated HOT partition. The directory holds the active set and is
//! refreshed from a [`HotZoneSource`] on a timer.

mod directory;
mod source;

pub use directory::HotZoneDirectory;
pub use source::{FileHotZoneSource, HotZoneSource, StaticHotZoneSource};

use serde::{Deserialize, Serialize};

/// Length of the geohash prefix that identifies a hot zone.
pub const HOT_ZONE_PREFIX_LEN: usize = 4;

/// A configured hot zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotZoneConfig {
    /// Geohash prefix (4 characters)
    pub geohash_prefix: String,

    /// Human-readable label
    #[serde(default)]
    pub description: String,

    /// Advisory search radius cap in meters
    #[serde(default = "default_radius_limit_m")]
    pub radius_limit_m: u32,

    /// Inactive zones are ignored
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_radius_limit_m() -> u32 {
    1000
}

fn default_active() -> bool {
    true
}

impl HotZoneConfig {
    pub fn new(geohash_prefix: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            geohash_prefix: geohash_prefix.into(),
            description: description.into(),
            radius_limit_m: default_radius_limit_m(),
            active: default_active(),
        }
    }
}
