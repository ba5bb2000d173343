//! Trace linker: resolve a correlation id from the host tracer with a
//! bounded fixed-delay retry, then persist it exactly once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tabwatch_checkpoint_store::{CheckpointStore, StoreError, TraceLink};
use tabwatch_core_types::{TabId, TimestampMs, WatchdogError, NO_TRACE_SENTINEL};

use crate::config::RetryPolicy;

/// Opaque handle to whatever the host tracer considers its active span.
#[derive(Clone, Debug)]
pub struct SpanHandle(pub serde_json::Value);

/// Structured form of a span, as produced by the tracer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: Option<String>,
}

/// External tracer collaborator, consumed through two capability queries.
/// Both may fail or come up empty; either degrades to the unresolved
/// sentinel for that attempt.
pub trait Tracer: Send + Sync {
    fn active_span(&self) -> Result<Option<SpanHandle>, WatchdogError>;
    fn span_record(&self, span: &SpanHandle) -> Result<Option<SpanRecord>, WatchdogError>;
}

/// One query round; tracer errors are caught locally and count as "no trace
/// available this attempt".
fn query_trace_id(tracer: &dyn Tracer) -> Option<String> {
    let span = match tracer.active_span() {
        Ok(span) => span?,
        Err(err) => {
            warn!(error = %err, "tracer query failed while fetching active span");
            return None;
        }
    };
    match tracer.span_record(&span) {
        Ok(record) => record?.trace_id,
        Err(err) => {
            warn!(error = %err, "tracer query failed while converting span");
            None
        }
    }
}

/// Resolves the correlation id, retrying with a fixed delay up to
/// `retry.max_retries` additional attempts before falling back to the
/// sentinel. The attempt counter lives in this call, not in global state.
pub async fn resolve_trace_id(tracer: Option<&Arc<dyn Tracer>>, retry: &RetryPolicy) -> String {
    let Some(tracer) = tracer else {
        debug!("no tracer configured, resolving to sentinel");
        return NO_TRACE_SENTINEL.to_string();
    };
    let mut attempts = 0u32;
    loop {
        if let Some(trace_id) = query_trace_id(tracer.as_ref()) {
            return trace_id;
        }
        if attempts >= retry.max_retries {
            warn!(
                attempts = attempts + 1,
                "could not obtain trace id, proceeding without trace linking"
            );
            return NO_TRACE_SENTINEL.to_string();
        }
        attempts += 1;
        tokio::time::sleep(retry.delay()).await;
    }
}

/// Resolves the correlation id and writes the tab's trace link. The write
/// happens at most once per tab; a pre-existing link is left untouched.
pub async fn link_trace(
    store: &CheckpointStore,
    tab_id: &TabId,
    tracer: Option<&Arc<dyn Tracer>>,
    retry: &RetryPolicy,
    session_start: TimestampMs,
) -> Result<String, StoreError> {
    let trace_id = resolve_trace_id(tracer, retry).await;
    let link = TraceLink::new(trace_id.clone(), session_start);
    if store.write_trace_link_once(tab_id, &link)? {
        if link.is_resolved() {
            debug!(tab = %tab_id, trace_id = %trace_id, "trace link stored");
        } else {
            debug!(tab = %tab_id, "trace link stored with the unresolved sentinel");
        }
    }
    Ok(trace_id)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;
    use tabwatch_checkpoint_store::MemoryKv;

    /// Replays a scripted sequence of per-attempt outcomes.
    struct ScriptedTracer {
        outcomes: Mutex<VecDeque<Result<Option<String>, WatchdogError>>>,
    }

    impl ScriptedTracer {
        fn new(outcomes: Vec<Result<Option<String>, WatchdogError>>) -> Arc<dyn Tracer> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
            })
        }
    }

    impl Tracer for ScriptedTracer {
        fn active_span(&self) -> Result<Option<SpanHandle>, WatchdogError> {
            match self.outcomes.lock().pop_front() {
                Some(Ok(Some(trace_id))) => {
                    Ok(Some(SpanHandle(serde_json::json!({ "trace_id": trace_id }))))
                }
                Some(Ok(None)) | None => Ok(None),
                Some(Err(err)) => Err(err),
            }
        }

        fn span_record(&self, span: &SpanHandle) -> Result<Option<SpanRecord>, WatchdogError> {
            Ok(Some(SpanRecord {
                trace_id: span.0["trace_id"].as_str().map(str::to_string),
            }))
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn resolves_on_a_later_attempt() {
        let tracer = ScriptedTracer::new(vec![Ok(None), Ok(None), Ok(Some("abc123".into()))]);
        let resolved = resolve_trace_id(Some(&tracer), &fast_retry(3)).await;
        assert_eq!(resolved, "abc123");
    }

    #[tokio::test]
    async fn exhaustion_resolves_to_the_sentinel() {
        let tracer = ScriptedTracer::new(vec![Ok(None); 4]);
        let resolved = resolve_trace_id(Some(&tracer), &fast_retry(3)).await;
        assert_eq!(resolved, NO_TRACE_SENTINEL);
    }

    #[tokio::test]
    async fn tracer_errors_count_as_missing_attempts() {
        let tracer = ScriptedTracer::new(vec![
            Err(WatchdogError::new("tracer exploded")),
            Ok(Some("abc123".into())),
        ]);
        let resolved = resolve_trace_id(Some(&tracer), &fast_retry(1)).await;
        assert_eq!(resolved, "abc123");
    }

    #[tokio::test]
    async fn absent_tracer_degrades_immediately() {
        let resolved = resolve_trace_id(None, &fast_retry(3)).await;
        assert_eq!(resolved, NO_TRACE_SENTINEL);
    }

    #[tokio::test]
    async fn link_trace_writes_at_most_once() {
        let store = CheckpointStore::new(std::sync::Arc::new(MemoryKv::new()));
        let tab = TabId::from("t1");
        let tracer = ScriptedTracer::new(vec![Ok(Some("first".into())), Ok(Some("second".into()))]);

        link_trace(&store, &tab, Some(&tracer), &fast_retry(0), 1_000)
            .await
            .unwrap();
        link_trace(&store, &tab, Some(&tracer), &fast_retry(0), 2_000)
            .await
            .unwrap();

        let link = store.read_trace_link(&tab).unwrap().unwrap();
        assert_eq!(link.trace_id, "first");
        assert_eq!(link.session_start, 1_000);
    }
}
