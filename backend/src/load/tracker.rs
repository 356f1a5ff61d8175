//! Load run state machine.
//!
//! One tracker guards one bulk-load run: NOT_STARTED → IN_PROGRESS →
//! {COMPLETED, ABORTED}. Transitions are compare-and-swap on an atomic
//! status byte, so the loader's completion path and an external abort can
//! race freely - whichever lands first wins and the loser is a no-op.
//!
//! A polling reader (the status endpoint) observes the tracker while the
//! loader mutates it; everything it reads is a single atomic load, never a
//! torn value. The abort reason sits behind a mutex that is only held for
//! the assignment, never across a record submission.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::error::TrackerError;
use crate::models::LoadStatus;

/// State machine and progress counters for one bulk-load run.
#[derive(Debug)]
pub struct LoadStatusTracker {
    status: AtomicU8,
    processed: AtomicU64,
    abort_reason: Mutex<Option<String>>,
}

/// Read-only progress view, safe to serve to concurrent pollers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadProgress {
    /// Current run status.
    pub status: LoadStatus,
    /// Records processed so far.
    pub records_processed: u64,
}

impl LoadStatusTracker {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(LoadStatus::NotStarted.as_u8()),
            processed: AtomicU64::new(0),
            abort_reason: Mutex::new(None),
        }
    }

    /// Current status.
    pub fn status(&self) -> LoadStatus {
        LoadStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Records processed so far.
    pub fn records_processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    /// Snapshot for pollers.
    pub fn progress(&self) -> LoadProgress {
        LoadProgress {
            status: self.status(),
            records_processed: self.records_processed(),
        }
    }

    /// Move NOT_STARTED → IN_PROGRESS.
    ///
    /// Starting a tracker that already left NOT_STARTED is a caller error,
    /// not a race: each run owns exactly one tracker.
    pub fn start(&self) -> Result<(), TrackerError> {
        self.transition(LoadStatus::NotStarted, LoadStatus::InProgress)
            .map_err(|current| TrackerError::AlreadyStarted {
                status: current.as_str(),
            })
    }

    /// Request cancellation: IN_PROGRESS → ABORTED.
    ///
    /// Returns whether this call performed the transition. Aborting a run
    /// that is not in progress (never started, already completed, already
    /// aborted) is a no-op, which keeps an abort endpoint idempotent.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        let mut guard = self
            .abort_reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self
            .transition(LoadStatus::InProgress, LoadStatus::Aborted)
            .is_ok()
        {
            *guard = Some(reason.into());
            true
        } else {
            false
        }
    }

    /// Normal completion: IN_PROGRESS → COMPLETED.
    ///
    /// Returns whether this call performed the transition; losing the race
    /// against an abort leaves the tracker ABORTED.
    pub fn complete(&self) -> bool {
        self.transition(LoadStatus::InProgress, LoadStatus::Completed)
            .is_ok()
    }

    /// Count one processed record.
    pub fn record_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Reason attached by the winning [`Self::abort`] call, if any.
    pub fn abort_reason(&self) -> Option<String> {
        self.abort_reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn transition(&self, from: LoadStatus, to: LoadStatus) -> Result<(), LoadStatus> {
        self.status
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(LoadStatus::from_u8)
    }
}

impl Default for LoadStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_initial_state() {
        let tracker = LoadStatusTracker::new();
        assert_eq!(tracker.status(), LoadStatus::NotStarted);
        assert_eq!(tracker.records_processed(), 0);
        assert_eq!(tracker.abort_reason(), None);
    }

    #[test]
    fn test_start_once() {
        let tracker = LoadStatusTracker::new();
        assert!(tracker.start().is_ok());
        assert_eq!(tracker.status(), LoadStatus::InProgress);

        let err = tracker.start().unwrap_err();
        assert_eq!(
            err,
            TrackerError::AlreadyStarted {
                status: "IN_PROGRESS"
            }
        );
    }

    #[test]
    fn test_abort_only_from_in_progress() {
        let tracker = LoadStatusTracker::new();
        assert!(!tracker.abort("too early"));
        assert_eq!(tracker.status(), LoadStatus::NotStarted);

        tracker.start().unwrap();
        assert!(tracker.abort("cancelled by client"));
        assert_eq!(tracker.status(), LoadStatus::Aborted);
        assert_eq!(tracker.abort_reason().as_deref(), Some("cancelled by client"));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let tracker = LoadStatusTracker::new();
        tracker.start().unwrap();
        assert!(tracker.abort("first"));

        // Second abort and late completion are no-ops
        assert!(!tracker.abort("second"));
        assert!(!tracker.complete());
        assert_eq!(tracker.status(), LoadStatus::Aborted);
        assert_eq!(tracker.abort_reason().as_deref(), Some("first"));

        let tracker = LoadStatusTracker::new();
        tracker.start().unwrap();
        assert!(tracker.complete());
        assert!(!tracker.abort("too late"));
        assert_eq!(tracker.status(), LoadStatus::Completed);
        assert_eq!(tracker.abort_reason(), None);
    }

    #[test]
    fn test_progress_snapshot() {
        let tracker = LoadStatusTracker::new();
        tracker.start().unwrap();
        assert_eq!(tracker.record_processed(), 1);
        assert_eq!(tracker.record_processed(), 2);

        let progress = tracker.progress();
        assert_eq!(progress.status, LoadStatus::InProgress);
        assert_eq!(progress.records_processed, 2);
    }

    #[test]
    fn test_concurrent_abort_and_complete_single_winner() {
        // Race the two terminal transitions many times; exactly one must win.
        for _ in 0..100 {
            let tracker = Arc::new(LoadStatusTracker::new());
            tracker.start().unwrap();

            let aborter = {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.abort("race"))
            };
            let completer = {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.complete())
            };

            let aborted = aborter.join().unwrap();
            let completed = completer.join().unwrap();
            assert!(aborted ^ completed);

            let status = tracker.status();
            assert!(status.is_terminal());
            assert_eq!(status == LoadStatus::Aborted, aborted);
        }
    }
}
