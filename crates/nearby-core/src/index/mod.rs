//! Sharded spatial index.
//!
//! Index entries map a storage-precision geohash to record ids. Entries in
//! hot zones live in the HOT partition, everything else in STANDARD. The
//! [`SpatialIndexStore`] keeps each record in exactly one place.

mod partition;
mod store;

pub use partition::{InMemoryPartition, IndexPartition, PartitionKind};
pub use store::{IndexSizes, SpatialIndexStore};
