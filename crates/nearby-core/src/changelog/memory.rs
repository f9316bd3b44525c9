use super::event::{ChangeEvent, ChangeKind, EventId};
use super::ChangeLog;
use crate::records::RecordId;
use crate::{ChangeLogError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeSet;

/// Event list plus processed bookkeeping, shared by both log backends.
#[derive(Debug, Default)]
pub(crate) struct ChangeLogState {
    /// Event with id `n` lives at index `n - 1`
    events: Vec<ChangeEvent>,
    unprocessed: BTreeSet<EventId>,
}

impl ChangeLogState {
    pub(crate) fn next_id(&self) -> EventId {
        self.events.len() as EventId + 1
    }

    pub(crate) fn new_event(
        &self,
        record_id: RecordId,
        kind: ChangeKind,
        created_at: DateTime<Utc>,
    ) -> ChangeEvent {
        ChangeEvent {
            id: self.next_id(),
            record_id,
            kind,
            created_at,
        }
    }

    /// Add an event. Its id must be the next in sequence.
    pub(crate) fn push(&mut self, event: ChangeEvent) -> std::result::Result<(), String> {
        let expected = self.next_id();
        if event.id != expected {
            return Err(format!(
                "event id {} out of sequence, expected {}",
                event.id, expected
            ));
        }
        self.unprocessed.insert(event.id);
        self.events.push(event);
        Ok(())
    }

    /// Reject ids that were never appended.
    pub(crate) fn check_known(&self, ids: &[EventId]) -> std::result::Result<(), ChangeLogError> {
        let last = self.events.len() as EventId;
        match ids.iter().find(|id| **id == 0 || **id > last) {
            Some(id) => Err(ChangeLogError::UnknownEvent(*id)),
            None => Ok(()),
        }
    }

    /// Mark ids processed; returns how many changed state.
    pub(crate) fn mark(&mut self, ids: &[EventId]) -> usize {
        ids.iter().filter(|id| self.unprocessed.remove(id)).count()
    }

    pub(crate) fn poll(&self, limit: usize) -> Vec<ChangeEvent> {
        self.unprocessed
            .iter()
            .take(limit)
            .filter_map(|id| self.events.get((*id - 1) as usize).cloned())
            .collect()
    }

    pub(crate) fn count_unprocessed(&self) -> u64 {
        self.unprocessed.len() as u64
    }

    pub(crate) fn oldest_unprocessed(&self) -> Option<DateTime<Utc>> {
        self.unprocessed
            .iter()
            .filter_map(|id| self.events.get((*id - 1) as usize))
            .map(|event| event.created_at)
            .min()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }
}

/// Process-local change log.
#[derive(Debug, Default)]
pub struct InMemoryChangeLog {
    state: Mutex<ChangeLogState>,
}

impl InMemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events ever appended.
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChangeLog for InMemoryChangeLog {
    async fn append(&self, record_id: RecordId, kind: ChangeKind) -> Result<ChangeEvent> {
        let mut state = self.state.lock();
        let event = state.new_event(record_id, kind, Utc::now());
        state
            .push(event.clone())
            .map_err(ChangeLogError::WriteFailed)?;
        Ok(event)
    }

    async fn poll_unprocessed(&self, limit: usize) -> Result<Vec<ChangeEvent>> {
        Ok(self.state.lock().poll(limit))
    }

    async fn mark_processed(&self, ids: &[EventId]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_known(ids)?;
        state.mark(ids);
        Ok(())
    }

    async fn count_unprocessed(&self) -> Result<u64> {
        Ok(self.state.lock().count_unprocessed())
    }

    async fn oldest_unprocessed_created_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.state.lock().oldest_unprocessed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_append_assigns_sequential_ids() {
        let log = InMemoryChangeLog::new();
        let first = log.append(10, ChangeKind::Created).await.unwrap();
        let second = log.append(10, ChangeKind::Updated).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.kind, ChangeKind::Updated);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_poll_respects_limit_and_order() {
        let log = InMemoryChangeLog::new();
        for record_id in 1..=5 {
            log.append(record_id, ChangeKind::Created).await.unwrap();
        }

        let batch = log.poll_unprocessed(3).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // polling does not consume
        assert_eq!(log.poll_unprocessed(3).await.unwrap().len(), 3);
        assert_eq!(log.count_unprocessed().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_mark_processed() {
        let log = InMemoryChangeLog::new();
        for record_id in 1..=4 {
            log.append(record_id, ChangeKind::Created).await.unwrap();
        }

        log.mark_processed(&[1, 3]).await.unwrap();
        // idempotent
        log.mark_processed(&[1]).await.unwrap();

        let ids: Vec<_> = log
            .poll_unprocessed(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(log.count_unprocessed().await.unwrap(), 2);
        // events are never deleted
        assert_eq!(log.len(), 4);
    }

    #[tokio::test]
    async fn test_mark_unknown_id_fails_without_side_effects() {
        let log = InMemoryChangeLog::new();
        log.append(1, ChangeKind::Created).await.unwrap();

        let err = log.mark_processed(&[1, 9]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ChangeLog(ChangeLogError::UnknownEvent(9))
        ));
        assert_eq!(log.count_unprocessed().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oldest_unprocessed() {
        let log = InMemoryChangeLog::new();
        assert!(log.oldest_unprocessed_created_at().await.unwrap().is_none());

        let first = log.append(1, ChangeKind::Created).await.unwrap();
        let second = log.append(2, ChangeKind::Created).await.unwrap();
        assert_eq!(
            log.oldest_unprocessed_created_at().await.unwrap(),
            Some(first.created_at)
        );

        log.mark_processed(&[first.id]).await.unwrap();
        assert_eq!(
            log.oldest_unprocessed_created_at().await.unwrap(),
            Some(second.created_at)
        );

        log.mark_processed(&[second.id]).await.unwrap();
        assert!(log.oldest_unprocessed_created_at().await.unwrap().is_none());
    }

    #[test]
    fn test_state_rejects_out_of_sequence() {
        let mut state = ChangeLogState::default();
        let mut event = state.new_event(1, ChangeKind::Created, Utc::now());
        event.id = 5;
        assert!(state.push(event).is_err());
        assert_eq!(state.len(), 0);
    }
}
