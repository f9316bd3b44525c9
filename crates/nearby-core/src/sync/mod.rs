//! Change-log driven index synchronization.
//!
//! [`IndexSynchronizer`] applies batches of change events to the spatial
//! index; [`SyncScheduler`] runs it on a fixed delay alongside the hot-zone
//! refresh timer.

mod scheduler;
mod synchronizer;

pub use scheduler::{SyncScheduler, TaskInfo, TaskStatus, HOT_ZONE_REFRESH_TASK, INDEX_SYNC_TASK};
pub use synchronizer::{Backlog, IndexSynchronizer};
