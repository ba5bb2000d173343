use serde::{Deserialize, Serialize};

use tabwatch_core_types::{TabId, TimestampMs, VisibilityState, NO_TRACE_SENTINEL};

/// Durable per-tab lifecycle record.
///
/// One record per tab, overwritten in full on every lifecycle event. A later
/// page load reads it back to decide whether the tab died cleanly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub tab_id: TabId,
    /// True only when the terminal unload handler produced the write.
    pub clean_close: bool,
    /// Mirrors `clean_close`; true only on the terminal write.
    pub unload_fired: bool,
    /// Monotonic false -> true, flipped once by the scanner, never reset.
    pub reviewed: bool,
    /// Fixed at the first checkpoint for this tab; never changes afterwards.
    pub session_start: TimestampMs,
    pub last_visibility_state: VisibilityState,
    pub last_visibility_update: TimestampMs,
    /// Derived on every write; informational.
    pub minutes_session_start_to_last_viewed: i64,
}

impl Checkpoint {
    pub fn minutes_since_session_start(&self) -> i64 {
        minutes_between(self.session_start, self.last_visibility_update)
    }

    /// Milliseconds since the record was last refreshed.
    pub fn age_ms(&self, now: TimestampMs) -> i64 {
        now - self.last_visibility_update
    }
}

/// Floored whole minutes between two millisecond instants.
pub fn minutes_between(start: TimestampMs, end: TimestampMs) -> i64 {
    (end - start).div_euclid(60_000)
}

/// Per-tab trace linkage, written at most once and read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceLink {
    pub trace_id: String,
    pub session_start: TimestampMs,
}

impl TraceLink {
    pub fn new(trace_id: impl Into<String>, session_start: TimestampMs) -> Self {
        Self {
            trace_id: trace_id.into(),
            session_start,
        }
    }

    pub fn unresolved(session_start: TimestampMs) -> Self {
        Self::new(NO_TRACE_SENTINEL, session_start)
    }

    pub fn is_resolved(&self) -> bool {
        self.trace_id != NO_TRACE_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_are_floored() {
        assert_eq!(minutes_between(0, 59_999), 0);
        assert_eq!(minutes_between(0, 60_000), 1);
        assert_eq!(minutes_between(0, 15 * 60_000 + 30_000), 15);
    }

    #[test]
    fn unresolved_links_carry_the_sentinel() {
        let link = TraceLink::unresolved(42);
        assert_eq!(link.trace_id, NO_TRACE_SENTINEL);
        assert!(!link.is_resolved());
        assert!(TraceLink::new("abc123", 42).is_resolved());
    }
}
