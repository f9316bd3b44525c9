//! Nearby Core - geohash proximity search
//!
//! This library answers "what is within N meters of this point" over a set
//! of geo-tagged records:
//!
//! - Geohash cell lookups over a spatial index split into HOT and STANDARD
//!   partitions by configured hot zones
//! - Eventual index consistency driven by an append-only change log
//! - TTL caches in front of both the index and the record store
//! - Exact haversine filtering, stable ordering and cursor pagination

pub mod cache;
pub mod changelog;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod health;
pub mod hotzone;
pub mod index;
pub mod metrics;
pub mod records;
pub mod search;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use engine::{ProximityService, ProximityServiceBuilder};
pub use error::{ChangeLogError, IndexError, ValidationError};
pub use error::{Error, Result};
