//! A framework-agnostic wrapper over [`crate::router::MultiSpaceRouter`]:
//! coalesced push scheduling, full flush, and consecutive-failure
//! quarantine.

use crate::router::{MultiSpaceRouter, PullSource};
use betterbase_core::{ErrorKind, Result, SyncAdapter};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Touched-collection coalescing: repeated `schedule_push` calls for the
/// same collection before a flush collapse into one push.
#[derive(Default)]
pub struct Scheduler {
    dirty: Mutex<HashSet<String>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_push(&self, collection: &str) {
        self.dirty.lock().insert(collection.to_string());
    }

    /// Drain and return every collection scheduled since the last call.
    pub fn take_dirty(&self) -> Vec<String> {
        self.dirty.lock().drain().collect()
    }
}

const QUARANTINE_THRESHOLD: u32 = 5;

/// Tracks consecutive permanent failures per record id, quarantining one
/// once it crosses [`QUARANTINE_THRESHOLD`]. Transient/auth/capacity
/// failures never count toward quarantine — they are expected to clear on
/// retry rather than indicate a structurally broken record.
#[derive(Default)]
pub struct QuarantineTracker {
    consecutive_failures: Mutex<HashMap<String, u32>>,
    quarantined: Mutex<HashSet<String>>,
}

impl QuarantineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome for `id`; returns `true` if this call just pushed
    /// it into quarantine.
    pub fn record_failure(&self, id: &str, kind: ErrorKind) -> bool {
        if kind != ErrorKind::Permanent {
            self.consecutive_failures.lock().remove(id);
            return false;
        }
        let mut counts = self.consecutive_failures.lock();
        let count = counts.entry(id.to_string()).or_insert(0);
        *count += 1;
        if *count >= QUARANTINE_THRESHOLD {
            self.quarantined.lock().insert(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn record_success(&self, id: &str) {
        self.consecutive_failures.lock().remove(id);
    }

    pub fn is_quarantined(&self, id: &str) -> bool {
        self.quarantined.lock().contains(id)
    }
}

/// Summary of one [`SyncManager::flush_all`] pass.
pub struct FlushReport {
    pub pushed: usize,
    pub pulled_collections: usize,
    pub newly_quarantined: Vec<String>,
}

/// Ties the scheduler, quarantine tracker, and router together into the
/// push-then-pull cycle a sync engine drives on a timer or on demand.
#[derive(Default)]
pub struct SyncManager {
    scheduler: Scheduler,
    quarantine: QuarantineTracker,
}

impl SyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_push(&self, collection: &str) {
        self.scheduler.schedule_push(collection);
    }

    pub fn quarantine(&self) -> &QuarantineTracker {
        &self.quarantine
    }

    /// Push every collection touched since the last flush, then pull every
    /// registered collection. Per-record decrypt failures update the
    /// quarantine tracker but never abort the pass.
    pub async fn flush_all(&self, adapter: &dyn SyncAdapter, router: &mut MultiSpaceRouter, source: &dyn PullSource) -> Result<FlushReport> {
        let collections = adapter.collections();
        let mut pushed = 0;

        for def in &collections {
            for space in router.active_spaces() {
                let dirty = adapter.get_dirty(&def.name, &space).await?;
                if dirty.is_empty() {
                    continue;
                }
                let mut by_space = HashMap::new();
                by_space.insert(Some(space.clone()), dirty);
                let acks = router.push(by_space, &def.name, &HashMap::new());
                if acks.is_empty() {
                    continue;
                }
                let ids: Vec<String> = acks.iter().map(|a| a.id.as_str().to_string()).collect();
                adapter.mark_synced(&def.name, &space, &ids).await?;
                pushed += acks.len();
            }
        }

        let mut pulled_collections = 0;
        let mut newly_quarantined = Vec::new();
        for def in &collections {
            let outcome = router.pull(&def.name, source).await?;

            for failure in &outcome.failures {
                if self.quarantine.record_failure(failure.id.as_str(), ErrorKind::Permanent) {
                    newly_quarantined.push(failure.id.as_str().to_string());
                }
            }
            if !outcome.records.is_empty() {
                for record in &outcome.records {
                    self.quarantine.record_success(record.id.as_str());
                }
                let server_seq = outcome.records.iter().map(|r| r.sequence).max().unwrap_or(0);
                adapter.apply_remote_records(def, outcome.records, server_seq).await?;
                pulled_collections += 1;
            }
        }

        self.scheduler.take_dirty();
        Ok(FlushReport { pushed, pulled_collections, newly_quarantined })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_coalesces_repeated_schedules() {
        let scheduler = Scheduler::new();
        scheduler.schedule_push("notes");
        scheduler.schedule_push("notes");
        scheduler.schedule_push("tasks");
        let mut dirty = scheduler.take_dirty();
        dirty.sort();
        assert_eq!(dirty, vec!["notes".to_string(), "tasks".to_string()]);
        assert!(scheduler.take_dirty().is_empty());
    }

    #[test]
    fn quarantines_after_five_consecutive_permanent_failures() {
        let tracker = QuarantineTracker::new();
        for _ in 0..4 {
            assert!(!tracker.record_failure("rec-1", ErrorKind::Permanent));
        }
        assert!(tracker.record_failure("rec-1", ErrorKind::Permanent));
        assert!(tracker.is_quarantined("rec-1"));
    }

    #[test]
    fn transient_failures_do_not_count_toward_quarantine() {
        let tracker = QuarantineTracker::new();
        for _ in 0..10 {
            tracker.record_failure("rec-1", ErrorKind::Transient);
        }
        assert!(!tracker.is_quarantined("rec-1"));
    }

    #[test]
    fn success_resets_the_streak() {
        let tracker = QuarantineTracker::new();
        for _ in 0..4 {
            tracker.record_failure("rec-1", ErrorKind::Permanent);
        }
        tracker.record_success("rec-1");
        for _ in 0..4 {
            assert!(!tracker.record_failure("rec-1", ErrorKind::Permanent));
        }
        assert!(!tracker.is_quarantined("rec-1"));
    }
}
