use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shared error type for the tabwatch crates.
#[derive(Debug, Error, Clone)]
pub enum WatchdogError {
    #[error("{message}")]
    Message { message: String },
}

impl WatchdogError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Wall-clock instant in milliseconds since the Unix epoch.
pub type TimestampMs = i64;

pub fn now_ms() -> TimestampMs {
    Utc::now().timestamp_millis()
}

/// Sentinel stored and reported when no correlation id could be resolved.
pub const NO_TRACE_SENTINEL: &str = "no_trace_id_found";

/// Stable identifier for one browser tab instance.
///
/// Generated once per tab and cached in tab-scoped storage; two tabs open
/// concurrently in the same origin never share an id.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TabId(pub String);

impl TabId {
    /// Time-based id with a random suffix. Collisions are statistically
    /// negligible; no uniqueness proof is required.
    pub fn generate() -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
        Self(format!("tab_{}_{}", now_ms(), suffix))
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Last known page visibility for a tab.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityState {
    Visible,
    Hidden,
}

impl VisibilityState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        }
    }
}

impl fmt::Display for VisibilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse temporal bucket assigned to an unclean termination.
///
/// Evaluated in declaration order; the first matching rule wins.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashType {
    /// Tab died with no visibility change ever recorded past the initial one.
    ClassicFreshVisibleCrash,
    /// Tab died while visible, within the primary crash window.
    RecentVisibleCrash,
    /// Any remaining visible, unclean case.
    Other,
}

impl CrashType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClassicFreshVisibleCrash => "classic_fresh_visible_crash",
            Self::RecentVisibleCrash => "recent_visible_crash",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for CrashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_ids_are_unique_and_prefixed() {
        let a = TabId::generate();
        let b = TabId::generate();
        assert!(a.0.starts_with("tab_"));
        assert_ne!(a, b);
    }

    #[test]
    fn visibility_round_trips_through_wire_tags() {
        let state: VisibilityState = serde_json::from_str("\"visible\"").unwrap();
        assert_eq!(state, VisibilityState::Visible);
        assert_eq!(
            serde_json::to_string(&VisibilityState::Hidden).unwrap(),
            "\"hidden\""
        );
    }

    #[test]
    fn crash_tags_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&CrashType::ClassicFreshVisibleCrash).unwrap(),
            "\"classic_fresh_visible_crash\""
        );
        assert_eq!(CrashType::Other.as_str(), "other");
    }
}
