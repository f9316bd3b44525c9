//! Geohash encoding and great-circle distance.
//!
//! Pure functions with no shared state. Records are stored at
//! [`STORAGE_PRECISION`]; searches encode at a radius-dependent tier.

mod distance;
mod geohash;

pub use distance::{haversine_meters, validate_coordinates, EARTH_RADIUS_METERS};
pub use geohash::{encode, neighbors, BASE32, MAX_PRECISION, STORAGE_PRECISION};
