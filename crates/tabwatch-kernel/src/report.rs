//! Sentry-envelope reporter: serialize a classified event and fire it at the
//! ingestion endpoint, one shot, no retry.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use tabwatch_checkpoint_store::{Checkpoint, TraceLink};
use tabwatch_core_types::{CrashType, TimestampMs, WatchdogError, NO_TRACE_SENTINEL};

pub const ENVELOPE_CONTENT_TYPE: &str = "application/x-sentry-envelope";
pub const EVENT_MESSAGE: &str = "[tabwatch] unclean session detected";

#[derive(Clone, Debug, Error)]
pub enum ReportError {
    #[error("invalid dsn: {0}")]
    InvalidDsn(String),
    #[error("envelope encode failed: {0}")]
    Encode(String),
}

impl From<ReportError> for WatchdogError {
    fn from(value: ReportError) -> Self {
        WatchdogError::new(value.to_string())
    }
}

/// Parsed connection string of the form `scheme://publicKey@host/projectId`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dsn {
    raw: String,
    public_key: String,
    host: String,
    project_id: String,
}

impl Dsn {
    pub fn parse(raw: &str) -> Result<Self, ReportError> {
        let url = Url::parse(raw).map_err(|err| ReportError::InvalidDsn(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ReportError::InvalidDsn(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let public_key = url.username();
        if public_key.is_empty() {
            return Err(ReportError::InvalidDsn("missing public key".into()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ReportError::InvalidDsn("missing host".into()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let project_id = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ReportError::InvalidDsn("missing numeric project id".into()))?;
        Ok(Self {
            raw: raw.to_string(),
            public_key: public_key.to_string(),
            host,
            project_id: project_id.to_string(),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn envelope_url(&self) -> String {
        format!("https://{}/api/{}/envelope/", self.host, self.project_id)
    }
}

/// A classified, enriched unclean-session record ready for transmission.
#[derive(Clone, Debug)]
pub struct UncleanSessionEvent {
    pub checkpoint: Checkpoint,
    pub trace: Option<TraceLink>,
    pub crash_type: CrashType,
    /// Scan-time wall clock, used as the event timestamp.
    pub observed_at: TimestampMs,
}

impl UncleanSessionEvent {
    pub fn trace_id(&self) -> &str {
        self.trace
            .as_ref()
            .map(|link| link.trace_id.as_str())
            .unwrap_or(NO_TRACE_SENTINEL)
    }

    pub fn to_payload(&self) -> serde_json::Value {
        let trace_data = self
            .trace
            .as_ref()
            .map(|link| json!(link))
            .unwrap_or_else(|| json!({}));
        json!({
            "message": EVENT_MESSAGE,
            "level": "warning",
            "timestamp": self.observed_at.div_euclid(1_000),
            "extra": {
                "watchdog": &self.checkpoint,
                "trace_data": trace_data,
                "minutes_session_start_to_last_viewed":
                    self.checkpoint.minutes_since_session_start(),
            },
            "contexts": {
                "trace": { "trace_id": self.trace_id() }
            },
            "tags": {
                "watchdog": "unclean_session",
                "crash_type": self.crash_type,
            },
        })
    }
}

/// Three newline-joined JSON documents: envelope header, item header, event.
pub fn build_envelope(dsn: &Dsn, event: &UncleanSessionEvent) -> Result<String, ReportError> {
    let envelope_header = serde_json::to_string(&json!({
        "dsn": dsn.raw(),
        "sent_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
    .map_err(|err| ReportError::Encode(err.to_string()))?;
    let item_header = serde_json::to_string(&json!({ "type": "event" }))
        .map_err(|err| ReportError::Encode(err.to_string()))?;
    let payload = serde_json::to_string(&event.to_payload())
        .map_err(|err| ReportError::Encode(err.to_string()))?;
    Ok([envelope_header, item_header, payload].join("\n"))
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, event: &UncleanSessionEvent) -> Result<(), WatchdogError>;
}

/// Ships envelopes to the Sentry ingestion endpoint, fire-and-forget: the
/// send is spawned off and transport failures are logged, never retried.
pub struct SentryReporter {
    dsn: Dsn,
    client: reqwest::Client,
}

impl SentryReporter {
    pub fn new(dsn: Dsn) -> Self {
        Self {
            dsn,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Reporter for SentryReporter {
    async fn report(&self, event: &UncleanSessionEvent) -> Result<(), WatchdogError> {
        let body = build_envelope(&self.dsn, event)?;
        let url = self.dsn.envelope_url();
        let client = self.client.clone();
        tokio::spawn(async move {
            match client
                .post(&url)
                .header(CONTENT_TYPE, ENVELOPE_CONTENT_TYPE)
                .body(body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    debug!(%url, "sent unclean-session envelope");
                }
                Ok(response) => {
                    warn!(%url, status = %response.status(), "envelope send rejected");
                }
                Err(err) => {
                    warn!(%url, error = %err, "envelope send failed");
                }
            }
        });
        Ok(())
    }
}

/// Collects reported events in memory; used by tests and local-only hosts.
#[derive(Default)]
pub struct CapturingReporter {
    events: Mutex<Vec<UncleanSessionEvent>>,
}

impl CapturingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UncleanSessionEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Reporter for CapturingReporter {
    async fn report(&self, event: &UncleanSessionEvent) -> Result<(), WatchdogError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabwatch_core_types::{TabId, VisibilityState};

    fn sample_event() -> UncleanSessionEvent {
        UncleanSessionEvent {
            checkpoint: Checkpoint {
                tab_id: TabId::from("t1"),
                clean_close: false,
                unload_fired: false,
                reviewed: false,
                session_start: 1_000,
                last_visibility_state: VisibilityState::Visible,
                last_visibility_update: 1_000 + 15 * 60_000,
                minutes_session_start_to_last_viewed: 15,
            },
            trace: Some(TraceLink::new("abc123", 1_000)),
            crash_type: CrashType::RecentVisibleCrash,
            observed_at: 1_700_000_123_456,
        }
    }

    #[test]
    fn dsn_parses_the_documented_shape() {
        let dsn = Dsn::parse("https://pubkey@o123.ingest.sentry.io/456").unwrap();
        assert_eq!(dsn.public_key(), "pubkey");
        assert_eq!(
            dsn.envelope_url(),
            "https://o123.ingest.sentry.io/api/456/envelope/"
        );
    }

    #[test]
    fn dsn_keeps_an_explicit_port() {
        let dsn = Dsn::parse("http://key@localhost:9000/1").unwrap();
        assert_eq!(dsn.envelope_url(), "https://localhost:9000/api/1/envelope/");
    }

    #[test]
    fn malformed_dsns_are_rejected() {
        assert!(Dsn::parse("not a dsn").is_err());
        assert!(Dsn::parse("https://host/123").is_err()); // no public key
        assert!(Dsn::parse("https://key@host/abc").is_err()); // non-numeric project
        assert!(Dsn::parse("ftp://key@host/123").is_err());
    }

    #[test]
    fn envelope_is_three_json_documents() {
        let dsn = Dsn::parse("https://pubkey@sentry.example.com/42").unwrap();
        let envelope = build_envelope(&dsn, &sample_event()).unwrap();
        let lines: Vec<&str> = envelope.split('\n').collect();
        assert_eq!(lines.len(), 3);

        let header: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(header["dsn"], "https://pubkey@sentry.example.com/42");
        assert!(header["sent_at"].is_string());

        let item: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(item["type"], "event");

        let payload: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(payload["message"], EVENT_MESSAGE);
        assert_eq!(payload["level"], "warning");
        assert_eq!(payload["timestamp"], 1_700_000_123);
        assert_eq!(payload["tags"]["watchdog"], "unclean_session");
        assert_eq!(payload["tags"]["crash_type"], "recent_visible_crash");
        assert_eq!(payload["contexts"]["trace"]["trace_id"], "abc123");
        assert_eq!(payload["extra"]["minutes_session_start_to_last_viewed"], 15);
        assert_eq!(payload["extra"]["watchdog"]["tab_id"], "t1");
        assert_eq!(payload["extra"]["trace_data"]["session_start"], 1_000);
    }

    #[test]
    fn missing_trace_degrades_to_the_sentinel() {
        let mut event = sample_event();
        event.trace = None;
        let payload = event.to_payload();
        assert_eq!(payload["contexts"]["trace"]["trace_id"], NO_TRACE_SENTINEL);
        assert_eq!(payload["extra"]["trace_data"], serde_json::json!({}));
    }
}
