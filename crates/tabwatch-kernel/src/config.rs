use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunable knobs for the watchdog runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Visible unclean records younger than this (minutes from session start
    /// to last update) classify as `recent_visible_crash`.
    pub primary_visible_crash_minutes: i64,
    /// Hidden unclean records older than this are treated as abandoned
    /// background tabs and deleted, not reported.
    pub hidden_grace_minutes: i64,
    /// Bounded fixed-delay retry for resolving the correlation id.
    pub trace_retry: RetryPolicy,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            primary_visible_crash_minutes: 30,
            hidden_grace_minutes: 10,
            trace_retry: RetryPolicy::default(),
        }
    }
}

impl WatchdogConfig {
    pub fn hidden_grace_ms(&self) -> i64 {
        self.hidden_grace_minutes * 60_000
    }

    pub fn primary_visible_crash_ms(&self) -> i64 {
        self.primary_visible_crash_minutes * 60_000
    }
}

/// Fixed-delay retry, scoped to a single call site. Worst-case latency is
/// `max_retries * delay` on top of the initial attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classification_constants() {
        let config = WatchdogConfig::default();
        assert_eq!(config.primary_visible_crash_minutes, 30);
        assert_eq!(config.hidden_grace_minutes, 10);
        assert_eq!(config.hidden_grace_ms(), 600_000);
        assert_eq!(config.trace_retry.max_retries, 3);
        assert_eq!(config.trace_retry.delay(), Duration::from_millis(1_000));
    }
}
