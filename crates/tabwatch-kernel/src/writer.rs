//! Checkpoint writer: one full-overwrite record per lifecycle event.

use tracing::debug;

use tabwatch_checkpoint_store::{minutes_between, Checkpoint, CheckpointStore, StoreError};
use tabwatch_core_types::{TabId, TimestampMs, VisibilityState};

/// Writes the current tab's lifecycle checkpoints.
///
/// `session_start` is fixed at construction and preserved verbatim across
/// every subsequent write for this tab.
pub struct CheckpointWriter {
    store: CheckpointStore,
    tab_id: TabId,
    session_start: TimestampMs,
}

impl CheckpointWriter {
    pub fn new(store: CheckpointStore, tab_id: TabId, session_start: TimestampMs) -> Self {
        Self {
            store,
            tab_id,
            session_start,
        }
    }

    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    pub fn session_start(&self) -> TimestampMs {
        self.session_start
    }

    /// Visibility-change write: the record stays a crash candidate.
    pub fn record_visibility(
        &self,
        state: VisibilityState,
        now: TimestampMs,
    ) -> Result<(), StoreError> {
        self.write(state, now, false)
    }

    /// Terminal unload write: marks the session as cleanly closed. Duplicate
    /// firings produce identical writes.
    pub fn record_unload(&self, state: VisibilityState, now: TimestampMs) -> Result<(), StoreError> {
        self.write(state, now, true)
    }

    fn write(
        &self,
        state: VisibilityState,
        now: TimestampMs,
        terminal: bool,
    ) -> Result<(), StoreError> {
        let checkpoint = Checkpoint {
            tab_id: self.tab_id.clone(),
            clean_close: terminal,
            unload_fired: terminal,
            reviewed: false,
            session_start: self.session_start,
            last_visibility_state: state,
            last_visibility_update: now,
            minutes_session_start_to_last_viewed: minutes_between(self.session_start, now),
        };
        self.store.write_checkpoint(&checkpoint)?;
        debug!(tab = %self.tab_id, terminal, state = %state, "stored checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tabwatch_checkpoint_store::MemoryKv;

    fn writer() -> (CheckpointWriter, CheckpointStore) {
        let store = CheckpointStore::new(Arc::new(MemoryKv::new()));
        let writer = CheckpointWriter::new(store.clone(), TabId::from("t1"), 1_000);
        (writer, store)
    }

    #[test]
    fn visibility_writes_keep_the_record_a_candidate() {
        let (writer, store) = writer();
        writer
            .record_visibility(VisibilityState::Visible, 1_000)
            .unwrap();
        let cp = store.read_checkpoint_for(writer.tab_id()).unwrap().unwrap();
        assert!(!cp.clean_close);
        assert!(!cp.unload_fired);
        assert!(!cp.reviewed);
        assert_eq!(cp.session_start, 1_000);
        assert_eq!(cp.last_visibility_update, 1_000);
        assert_eq!(cp.minutes_session_start_to_last_viewed, 0);
    }

    #[test]
    fn writes_overwrite_and_preserve_session_start() {
        let (writer, store) = writer();
        writer
            .record_visibility(VisibilityState::Visible, 1_000)
            .unwrap();
        writer
            .record_visibility(VisibilityState::Hidden, 1_000 + 15 * 60_000)
            .unwrap();
        assert_eq!(store.checkpoint_keys().unwrap().len(), 1);
        let cp = store.read_checkpoint_for(writer.tab_id()).unwrap().unwrap();
        assert_eq!(cp.session_start, 1_000);
        assert_eq!(cp.last_visibility_state, VisibilityState::Hidden);
        assert_eq!(cp.minutes_session_start_to_last_viewed, 15);
    }

    #[test]
    fn unload_marks_clean_close_and_is_idempotent() {
        let (writer, store) = writer();
        writer
            .record_visibility(VisibilityState::Visible, 1_000)
            .unwrap();
        writer.record_unload(VisibilityState::Visible, 2_000).unwrap();
        let first = store.read_checkpoint_for(writer.tab_id()).unwrap().unwrap();
        assert!(first.clean_close);
        assert!(first.unload_fired);
        assert!(!first.reviewed);
        assert_eq!(first.last_visibility_update, 2_000);

        writer.record_unload(VisibilityState::Visible, 2_000).unwrap();
        let second = store.read_checkpoint_for(writer.tab_id()).unwrap().unwrap();
        assert_eq!(first, second);
    }
}
