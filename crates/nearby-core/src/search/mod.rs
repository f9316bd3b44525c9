//! Radius search over the spatial index.

pub mod cursor;
mod engine;

pub use engine::{
    precision_for_radius, NearbyItem, NearbyQuery, NearbySearchResponse, SearchEngine,
};
