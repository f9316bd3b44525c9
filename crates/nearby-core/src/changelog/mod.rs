//! Change log feeding the index synchronizer.
//!
//! Every record mutation appends one [`ChangeEvent`]. Events are never
//! deleted; the synchronizer polls unprocessed events in id order and marks
//! them processed once applied to the index.

mod event;
mod journal;
mod memory;

pub use event::{ChangeEvent, ChangeKind, EventId};
pub use journal::JournalChangeLog;
pub use memory::InMemoryChangeLog;

use crate::records::RecordId;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only log of record mutations.
#[async_trait]
pub trait ChangeLog: Send + Sync {
    /// Record a mutation; assigns the next event id.
    async fn append(&self, record_id: RecordId, kind: ChangeKind) -> Result<ChangeEvent>;

    /// Up to `limit` unprocessed events, ascending by id.
    async fn poll_unprocessed(&self, limit: usize) -> Result<Vec<ChangeEvent>>;

    /// Mark events processed. Already-processed ids are ignored.
    async fn mark_processed(&self, ids: &[EventId]) -> Result<()>;

    /// Number of events not yet processed.
    async fn count_unprocessed(&self) -> Result<u64>;

    /// Creation time of the oldest unprocessed event.
    async fn oldest_unprocessed_created_at(&self) -> Result<Option<DateTime<Utc>>>;
}
