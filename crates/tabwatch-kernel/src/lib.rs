#![forbid(unsafe_code)]

//! Retrospective detection of unclean browser-tab termination.
//!
//! The browser gives no reliable crash signal, so the watchdog infers one
//! from absence: every tab keeps a durable lifecycle checkpoint up to date,
//! and a later page load scans all checkpoints left behind, separates
//! genuine unclean terminations from clean closes and still-live tabs,
//! classifies them into coarse temporal buckets, and ships each one to the
//! reporting endpoint at most once per record.

pub mod config;
pub mod identity;
pub mod report;
pub mod scanner;
pub mod signals;
pub mod trace;
pub mod writer;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tabwatch_checkpoint_store::{CheckpointStore, KvStore};
use tabwatch_core_types::{now_ms, TabId, VisibilityState, WatchdogError};

pub use config::{RetryPolicy, WatchdogConfig};
pub use report::{
    CapturingReporter, Dsn, ReportError, Reporter, SentryReporter, UncleanSessionEvent,
};
pub use scanner::{classify, scan_and_report, ScanStats};
pub use signals::{LifecycleBus, LifecycleEvent};
pub use trace::{SpanHandle, SpanRecord, Tracer};
pub use writer::CheckpointWriter;

/// Assembles one watchdog instance for the current tab.
///
/// `origin_kv` is the namespace shared by every tab of the origin (where
/// checkpoints and trace links live); `tab_kv` is the session-lifetime store
/// unique to this tab instance (where the identity is cached).
pub struct WatchdogBuilder {
    origin_kv: Arc<dyn KvStore>,
    tab_kv: Arc<dyn KvStore>,
    signals: Arc<LifecycleBus>,
    tracer: Option<Arc<dyn Tracer>>,
    reporter: Option<Arc<dyn Reporter>>,
    config: WatchdogConfig,
    initial_visibility: VisibilityState,
}

impl WatchdogBuilder {
    pub fn new(origin_kv: Arc<dyn KvStore>, tab_kv: Arc<dyn KvStore>) -> Self {
        Self {
            origin_kv,
            tab_kv,
            signals: LifecycleBus::new(16),
            tracer: None,
            reporter: None,
            config: WatchdogConfig::default(),
            initial_visibility: VisibilityState::Visible,
        }
    }

    /// Visibility of the page at init time, used for the eager startup
    /// checkpoint. Defaults to visible; a host loading a background tab
    /// should pass its real state.
    pub fn with_initial_visibility(mut self, state: VisibilityState) -> Self {
        self.initial_visibility = state;
        self
    }

    pub fn with_signals(mut self, signals: Arc<LifecycleBus>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Overrides the reporter built from the DSN; used by tests and
    /// local-only hosts.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_config(mut self, config: WatchdogConfig) -> Self {
        self.config = config;
        self
    }

    /// Initializes the watchdog for this page load, in order: scan and
    /// report stale checkpoints (gated on having a reporting endpoint),
    /// establish the tab identity, resolve and persist the trace link with
    /// bounded retry, and only then install the lifecycle listeners plus one
    /// eager visible checkpoint.
    pub async fn init(self, dsn: Option<&str>) -> Result<WatchdogHandle, WatchdogError> {
        let store = CheckpointStore::new(self.origin_kv);

        let reporter: Option<Arc<dyn Reporter>> = match (self.reporter, dsn) {
            (Some(reporter), _) => Some(reporter),
            (None, Some(raw)) => match Dsn::parse(raw) {
                Ok(dsn) => Some(Arc::new(SentryReporter::new(dsn)) as Arc<dyn Reporter>),
                Err(err) => {
                    warn!(error = %err, "invalid dsn, skipping crash scan");
                    None
                }
            },
            (None, None) => {
                info!("no reporting endpoint configured, skipping crash scan");
                None
            }
        };
        if let Some(reporter) = &reporter {
            scanner::scan_and_report(&store, reporter, now_ms(), &self.config).await;
        }

        let tab_id = identity::tab_identity(&self.tab_kv)?;
        let session_start = now_ms();

        // Listener installation is gated on trace resolution finishing, so
        // every checkpoint written during this tab's life can be enriched.
        if let Err(err) = trace::link_trace(
            &store,
            &tab_id,
            self.tracer.as_ref(),
            &self.config.trace_retry,
            session_start,
        )
        .await
        {
            warn!(tab = %tab_id, error = %err, "trace link write failed, continuing without it");
        }

        let writer = CheckpointWriter::new(store, tab_id.clone(), session_start);
        if let Err(err) = writer.record_visibility(self.initial_visibility, now_ms()) {
            warn!(tab = %tab_id, error = %err, "initial checkpoint write failed");
        }

        let mut events = self.signals.subscribe();
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LifecycleEvent::Visibility(state)) => {
                        if let Err(err) = writer.record_visibility(state, now_ms()) {
                            warn!(error = %err, "checkpoint write failed");
                        }
                    }
                    Ok(LifecycleEvent::Unload(state)) => {
                        if let Err(err) = writer.record_unload(state, now_ms()) {
                            warn!(error = %err, "terminal checkpoint write failed");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lifecycle listener lagged behind");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        info!(tab = %tab_id, "watchdog initialized");
        Ok(WatchdogHandle {
            tab_id,
            listener: Mutex::new(Some(listener)),
        })
    }
}

/// Running watchdog for one tab. Dropping the handle leaves the listener
/// running; call [`WatchdogHandle::shutdown`] to remove it.
pub struct WatchdogHandle {
    tab_id: TabId,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl WatchdogHandle {
    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    /// Removes the lifecycle listeners. Safe to call multiple times or
    /// never.
    pub fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
            info!(tab = %self.tab_id, "watchdog listeners removed");
        }
    }

    /// Waits for the listener to drain and exit after the signal source has
    /// been dropped. Like `shutdown`, this detaches the listener.
    pub async fn join(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
    }
}
