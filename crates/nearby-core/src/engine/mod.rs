//! Service assembly.
//!
//! Wires configuration, backends, caches, the spatial index, the
//! synchronizer and the search engine into one [`ProximityService`].

mod service;

pub use service::{ComponentReport, ProximityService, ProximityServiceBuilder, ServiceStatus};
