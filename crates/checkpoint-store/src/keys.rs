//! Well-known keys inside the shared origin-scoped namespace.

use tabwatch_core_types::TabId;

/// Per-tab lifecycle checkpoint records.
pub const CHECKPOINT_PREFIX: &str = "checkpoint:";

/// Per-tab trace-linkage records.
pub const TRACE_PREFIX: &str = "trace:";

/// Cached tab identity. Lives in the tab-scoped store, never the shared one.
pub const TAB_ID_KEY: &str = "tabwatch:tab_id";

pub fn checkpoint_key(tab: &TabId) -> String {
    format!("{CHECKPOINT_PREFIX}{tab}")
}

pub fn trace_key(tab: &TabId) -> String {
    format!("{TRACE_PREFIX}{tab}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_tab_keys_are_prefix_scannable() {
        let tab = TabId::from("tab_1_abc");
        assert_eq!(checkpoint_key(&tab), "checkpoint:tab_1_abc");
        assert_eq!(trace_key(&tab), "trace:tab_1_abc");
        assert!(checkpoint_key(&tab).starts_with(CHECKPOINT_PREFIX));
    }
}
