//! Source-of-truth records and the service that mutates them.
//!
//! Every mutation goes through [`RecordService`], which saves the record,
//! appends a change event for the index synchronizer and evicts the
//! record cache.

mod record;
mod service;
mod store;

pub use record::{NewRecord, Record, RecordId, RecordStatus};
pub use service::{RecordService, FETCH_BATCH_SIZE};
pub use store::{InMemoryRecordStore, RecordStore};
