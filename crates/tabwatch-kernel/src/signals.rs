//! Injectable lifecycle signal source.
//!
//! The host embeds the watchdog and forwards its visibility-change and
//! teardown notifications onto the bus; tests drive the same bus directly.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use tabwatch_core_types::VisibilityState;

#[derive(Clone, Debug)]
pub enum LifecycleEvent {
    /// Page visibility toggled (foreground/background).
    Visibility(VisibilityState),
    /// Terminal page teardown, carrying the visibility at that moment.
    Unload(VisibilityState),
}

/// In-memory broadcast bus for lifecycle events.
pub struct LifecycleBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn emit_visibility(&self, state: VisibilityState) {
        self.emit(LifecycleEvent::Visibility(state));
    }

    pub fn emit_unload(&self, state: VisibilityState) {
        self.emit(LifecycleEvent::Unload(state));
    }

    fn emit(&self, event: LifecycleEvent) {
        trace!(?event, "lifecycle event");
        // No subscribers is fine: the watchdog may already be torn down.
        let _ = self.sender.send(event);
    }
}
