//! Durable change log backed by an append-only journal file.
//!
//! Each line is `<crc32 as 8 hex digits> <json entry>`. The in-memory state
//! is rebuilt by replaying the journal on open.

use super::event::{ChangeEvent, ChangeKind, EventId};
use super::memory::ChangeLogState;
use super::ChangeLog;
use crate::records::RecordId;
use crate::{ChangeLogError, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A journal line payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum JournalEntry {
    /// New change event
    Appended { event: ChangeEvent },
    /// Events marked processed by a sync batch
    Processed {
        ids: Vec<EventId>,
        timestamp: DateTime<Utc>,
    },
}

struct JournalInner {
    writer: BufWriter<File>,
    state: ChangeLogState,
}

impl JournalInner {
    fn write_entry(&mut self, entry: &JournalEntry) -> Result<()> {
        let line = encode_line(entry)?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| ChangeLogError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

/// Change log persisted to a JSON-lines journal.
pub struct JournalChangeLog {
    path: PathBuf,
    inner: Mutex<JournalInner>,
}

impl JournalChangeLog {
    /// Open (or create) the journal at `path` and replay it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                ChangeLogError::WriteFailed(format!("Failed to create journal directory: {}", e))
            })?;
        }

        let replay = if path.exists() {
            replay_journal(&path)?
        } else {
            Replay::default()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ChangeLogError::WriteFailed(format!("Failed to open journal: {}", e)))?;

        if let Some(valid_len) = replay.truncate_to {
            file.set_len(valid_len).map_err(|e| {
                ChangeLogError::WriteFailed(format!("Failed to truncate torn entry: {}", e))
            })?;
        }

        let mut writer = BufWriter::new(file);
        if replay.missing_newline {
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|e| ChangeLogError::WriteFailed(e.to_string()))?;
        }

        info!(
            path = %path.display(),
            events = replay.state.len(),
            unprocessed = replay.state.count_unprocessed(),
            "Change log journal opened"
        );

        Ok(Self {
            path,
            inner: Mutex::new(JournalInner {
                writer,
                state: replay.state,
            }),
        })
    }

    /// Journal file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total number of events ever appended.
    pub fn len(&self) -> usize {
        self.inner.lock().state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush buffered writes and fsync the journal.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .writer
            .flush()
            .and_then(|_| inner.writer.get_ref().sync_all())
            .map_err(|e| ChangeLogError::WriteFailed(format!("Failed to sync: {}", e)))?;
        debug!(path = %self.path.display(), "Change log journal synced");
        Ok(())
    }
}

#[async_trait]
impl ChangeLog for JournalChangeLog {
    async fn append(&self, record_id: RecordId, kind: ChangeKind) -> Result<ChangeEvent> {
        let mut inner = self.inner.lock();
        let event = inner.state.new_event(record_id, kind, Utc::now());

        inner.write_entry(&JournalEntry::Appended {
            event: event.clone(),
        })?;
        inner
            .state
            .push(event.clone())
            .map_err(ChangeLogError::WriteFailed)?;

        debug!(event_id = event.id, record_id, kind = ?kind, "Change event appended");
        Ok(event)
    }

    async fn poll_unprocessed(&self, limit: usize) -> Result<Vec<ChangeEvent>> {
        Ok(self.inner.lock().state.poll(limit))
    }

    async fn mark_processed(&self, ids: &[EventId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        inner.state.check_known(ids)?;
        inner.write_entry(&JournalEntry::Processed {
            ids: ids.to_vec(),
            timestamp: Utc::now(),
        })?;
        inner.state.mark(ids);
        Ok(())
    }

    async fn count_unprocessed(&self) -> Result<u64> {
        Ok(self.inner.lock().state.count_unprocessed())
    }

    async fn oldest_unprocessed_created_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.inner.lock().state.oldest_unprocessed())
    }
}

fn encode_line(entry: &JournalEntry) -> Result<String> {
    let json = serde_json::to_string(entry)?;
    let checksum = crc32fast::hash(json.as_bytes());
    Ok(format!("{:08x} {}\n", checksum, json))
}

fn decode_line(line: &str, line_no: u64) -> std::result::Result<JournalEntry, ChangeLogError> {
    let (checksum, json) = line.split_once(' ').ok_or_else(|| ChangeLogError::Corrupted {
        line: line_no,
        message: "missing checksum separator".into(),
    })?;

    let expected = u32::from_str_radix(checksum, 16).map_err(|e| ChangeLogError::Corrupted {
        line: line_no,
        message: format!("invalid checksum: {}", e),
    })?;
    let actual = crc32fast::hash(json.as_bytes());
    if expected != actual {
        return Err(ChangeLogError::ChecksumMismatch {
            line: line_no,
            expected,
            actual,
        });
    }

    serde_json::from_str(json).map_err(|e| ChangeLogError::Corrupted {
        line: line_no,
        message: format!("JSON parse error: {}", e),
    })
}

#[derive(Default)]
struct Replay {
    state: ChangeLogState,
    /// Set when a torn final line must be cut off
    truncate_to: Option<u64>,
    /// Final line was intact but lacks its terminator
    missing_newline: bool,
}

fn replay_journal(path: &Path) -> Result<Replay> {
    let data = fs::read(path).map_err(Error::Io)?;
    let mut replay = Replay::default();
    let mut offset = 0_u64;
    let mut segments = data.split(|b| *b == b'\n').enumerate().peekable();

    while let Some((idx, raw)) = segments.next() {
        let line_no = idx as u64 + 1;
        // the segment after the last '\n' has no terminator
        let is_tail = segments.peek().is_none();
        let line_start = offset;
        offset += raw.len() as u64 + if is_tail { 0 } else { 1 };

        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let parsed = std::str::from_utf8(raw)
            .map_err(|e| ChangeLogError::Corrupted {
                line: line_no,
                message: format!("invalid UTF-8: {}", e),
            })
            .and_then(|line| decode_line(line.trim_end_matches('\r'), line_no));

        let entry = match parsed {
            Ok(entry) => entry,
            Err(e) if is_tail => {
                warn!(
                    path = %path.display(),
                    line = line_no,
                    error = %e,
                    "Skipping torn journal entry"
                );
                replay.truncate_to = Some(line_start);
                break;
            }
            Err(e) => return Err(e.into()),
        };

        apply_entry(&mut replay.state, entry, line_no)?;
        if is_tail {
            replay.missing_newline = true;
        }
    }

    Ok(replay)
}

fn apply_entry(state: &mut ChangeLogState, entry: JournalEntry, line_no: u64) -> Result<()> {
    match entry {
        JournalEntry::Appended { event } => state.push(event).map_err(|message| {
            ChangeLogError::Corrupted {
                line: line_no,
                message,
            }
            .into()
        }),
        JournalEntry::Processed { ids, .. } => {
            state
                .check_known(&ids)
                .map_err(|e| ChangeLogError::Corrupted {
                    line: line_no,
                    message: e.to_string(),
                })?;
            state.mark(&ids);
            Ok(())
        }
    }
}
