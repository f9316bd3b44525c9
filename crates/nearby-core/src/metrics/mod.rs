//! Service metrics.

mod prometheus;

pub use self::prometheus::{ErrorType, ProximityMetrics, METRIC_PREFIX};
