use crate::records::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Change event sequence number, starting at 1.
pub type EventId = u64;

/// Kind of mutation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One record mutation awaiting (or past) index propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: EventId,
    pub record_id: RecordId,
    pub kind: ChangeKind,
    pub created_at: DateTime<Utc>,
}
