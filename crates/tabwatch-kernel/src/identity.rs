//! Tab identity over tab-scoped storage.
//!
//! The identity key must live in a storage primitive that is unique per tab
//! instance (session-lifetime storage): it survives reloads of the same tab,
//! while two tabs open concurrently in one origin get distinct stores and
//! therefore can never share a `TabId`.

use std::sync::Arc;

use tracing::debug;

use tabwatch_checkpoint_store::{keys, KvStore, StoreError};
use tabwatch_core_types::TabId;

/// Returns the cached tab id, generating and persisting one if absent.
pub fn tab_identity(tab_store: &Arc<dyn KvStore>) -> Result<TabId, StoreError> {
    if let Some(existing) = tab_store.get(keys::TAB_ID_KEY)? {
        return Ok(TabId(existing));
    }
    let tab_id = TabId::generate();
    tab_store.put(keys::TAB_ID_KEY, &tab_id.0)?;
    debug!(tab = %tab_id, "generated new tab identity");
    Ok(tab_id)
}
