use std::sync::Arc;

use tracing::debug;

use tabwatch_core_types::TabId;

use crate::errors::{StoreError, StoreErrorKind};
use crate::keys;
use crate::kv::KvStore;
use crate::model::{Checkpoint, TraceLink};

/// Typed view over the shared origin-scoped key-value namespace.
///
/// Writes are last-write-wins full overwrites; each tab owns exactly one
/// checkpoint key and one trace key, so concurrent tabs never contend on the
/// same key.
#[derive(Clone)]
pub struct CheckpointStore {
    kv: Arc<dyn KvStore>,
}

impl CheckpointStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let value = serde_json::to_string(checkpoint)
            .map_err(|err| StoreErrorKind::Encode(err.to_string()))?;
        self.kv.put(&keys::checkpoint_key(&checkpoint.tab_id), &value)
    }

    /// Reads the checkpoint stored at `key`. Undecodable bytes surface as a
    /// corrupt-record error so the scanner can delete them.
    pub fn read_checkpoint(&self, key: &str) -> Result<Option<Checkpoint>, StoreError> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|err| {
            StoreErrorKind::Corrupt {
                key: key.to_string(),
                detail: err.to_string(),
            }
            .into()
        })
    }

    pub fn read_checkpoint_for(&self, tab: &TabId) -> Result<Option<Checkpoint>, StoreError> {
        self.read_checkpoint(&keys::checkpoint_key(tab))
    }

    pub fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        self.kv.remove(key)
    }

    /// Every checkpoint key currently present, across all tabs.
    pub fn checkpoint_keys(&self) -> Result<Vec<String>, StoreError> {
        self.kv.keys_with_prefix(keys::CHECKPOINT_PREFIX)
    }

    /// Writes the trace link unless one already exists for the tab. Returns
    /// whether this call performed the write.
    pub fn write_trace_link_once(&self, tab: &TabId, link: &TraceLink) -> Result<bool, StoreError> {
        let key = keys::trace_key(tab);
        if self.kv.get(&key)?.is_some() {
            debug!(tab = %tab, "trace link already present, keeping the first write");
            return Ok(false);
        }
        let value =
            serde_json::to_string(link).map_err(|err| StoreErrorKind::Encode(err.to_string()))?;
        self.kv.put(&key, &value)?;
        Ok(true)
    }

    pub fn read_trace_link(&self, tab: &TabId) -> Result<Option<TraceLink>, StoreError> {
        let key = keys::trace_key(tab);
        let Some(raw) = self.kv.get(&key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|err| {
            StoreErrorKind::Corrupt {
                key,
                detail: err.to_string(),
            }
            .into()
        })
    }
}
