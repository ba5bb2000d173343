//! Crash scanner/classifier: iterate every stored checkpoint, decide
//! liveness/cleanliness retrospectively, classify the unclean ones, and emit
//! each report at most once per record.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tabwatch_checkpoint_store::{Checkpoint, CheckpointStore};
use tabwatch_core_types::{CrashType, TimestampMs, VisibilityState};

use crate::config::WatchdogConfig;
use crate::report::{Reporter, UncleanSessionEvent};

/// Per-pass accounting, mostly for logs and tests.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanStats {
    pub reported: usize,
    pub removed_corrupt: usize,
    pub removed_stale_hidden: usize,
    pub deferred_hidden: usize,
    pub skipped_clean: usize,
    pub skipped_reviewed: usize,
}

/// Pure classification of a visible unclean checkpoint. Rules are evaluated
/// in priority order; the first match wins, so a record that is both fresh
/// and recent is always `classic_fresh_visible_crash`. Deterministic for a
/// given record, which matters because hidden records can defer judgment
/// across several scans.
pub fn classify(checkpoint: &Checkpoint, config: &WatchdogConfig) -> CrashType {
    if checkpoint.last_visibility_update == checkpoint.session_start && !checkpoint.unload_fired {
        return CrashType::ClassicFreshVisibleCrash;
    }
    let visible_for = checkpoint.last_visibility_update - checkpoint.session_start;
    if visible_for < config.primary_visible_crash_ms() && !checkpoint.unload_fired {
        return CrashType::RecentVisibleCrash;
    }
    CrashType::Other
}

/// One scan pass over every checkpoint in the store.
///
/// Records already reviewed or cleanly closed are left untouched. Hidden
/// candidates get a grace window: young ones stay for a future scan, stale
/// ones are deleted as abandoned background tabs. Visible candidates are
/// classified, enriched with their trace link, marked reviewed, and handed
/// to the reporter. Undecodable records are deleted outright.
pub async fn scan_and_report(
    store: &CheckpointStore,
    reporter: &Arc<dyn Reporter>,
    now: TimestampMs,
    config: &WatchdogConfig,
) -> ScanStats {
    let mut stats = ScanStats::default();
    let keys = match store.checkpoint_keys() {
        Ok(keys) => keys,
        Err(err) => {
            warn!(error = %err, "checkpoint scan could not enumerate the store");
            return stats;
        }
    };

    for key in keys {
        let checkpoint = match store.read_checkpoint(&key) {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => continue,
            Err(err) if err.is_corrupt() => {
                warn!(%key, error = %err, "removing undecodable checkpoint");
                if let Err(err) = store.delete_key(&key) {
                    warn!(%key, error = %err, "failed to remove corrupt checkpoint");
                }
                stats.removed_corrupt += 1;
                continue;
            }
            Err(err) => {
                warn!(%key, error = %err, "checkpoint read failed, skipping");
                continue;
            }
        };

        if checkpoint.reviewed {
            stats.skipped_reviewed += 1;
            continue;
        }
        if checkpoint.clean_close {
            // Never a candidate; left in place as observed behavior.
            stats.skipped_clean += 1;
            continue;
        }

        match checkpoint.last_visibility_state {
            VisibilityState::Hidden => {
                if checkpoint.age_ms(now) > config.hidden_grace_ms() {
                    debug!(%key, "removing hidden checkpoint past the grace window");
                    if let Err(err) = store.delete_key(&key) {
                        warn!(%key, error = %err, "failed to remove stale hidden checkpoint");
                        continue;
                    }
                    stats.removed_stale_hidden += 1;
                } else {
                    // Not old enough to judge; a future scan decides.
                    stats.deferred_hidden += 1;
                }
            }
            VisibilityState::Visible => {
                let crash_type = classify(&checkpoint, config);

                // Claim the record before handing it off so a failed send can
                // never cause a duplicate report later.
                let mut reviewed = checkpoint.clone();
                reviewed.reviewed = true;
                if let Err(err) = store.write_checkpoint(&reviewed) {
                    warn!(%key, error = %err, "could not mark checkpoint reviewed, not reporting");
                    continue;
                }

                let trace = match store.read_trace_link(&checkpoint.tab_id) {
                    Ok(trace) => trace,
                    Err(err) => {
                        warn!(tab = %checkpoint.tab_id, error = %err, "trace link unreadable, reporting without it");
                        None
                    }
                };

                let event = UncleanSessionEvent {
                    checkpoint,
                    trace,
                    crash_type,
                    observed_at: now,
                };
                info!(%key, crash_type = %crash_type, "unclean session detected");
                if let Err(err) = reporter.report(&event).await {
                    // Accepted loss: the reviewed mark is not rolled back.
                    warn!(%key, error = %err, "report failed");
                }
                stats.reported += 1;
            }
        }
    }

    debug!(?stats, "checkpoint scan finished");
    stats
}
