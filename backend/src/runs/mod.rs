//! Load run registry.
//!
//! Keeps the live and recently finished bulk-load runs reachable by job id,
//! so a polling client and an abort request can address a run while the
//! loader is still working on it. Run state is ephemeral by design: a
//! restart forgets finished runs, the results having already been returned
//! to their callers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::load::{BulkLoadResult, LoadProgress, LoadStatusTracker};

/// Global registry shared by the HTTP handlers.
pub static LOAD_REGISTRY: Lazy<LoadRegistry> = Lazy::new(LoadRegistry::new);

/// One registered bulk-load run.
struct LoadRun {
    tracker: Arc<LoadStatusTracker>,
    started_at: String,
    finished_at: Option<String>,
    result: Option<Arc<BulkLoadResult>>,
}

/// Point-in-time view of one run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub progress: LoadProgress,
    pub result: Option<Arc<BulkLoadResult>>,
}

/// Registry of bulk-load runs keyed by job id.
pub struct LoadRegistry {
    runs: RwLock<HashMap<String, LoadRun>>,
}

impl LoadRegistry {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fresh run and hand back its id and tracker.
    pub fn register(&self) -> (String, Arc<LoadStatusTracker>) {
        let id = Uuid::new_v4().to_string();
        let tracker = Arc::new(LoadStatusTracker::new());
        let run = LoadRun {
            tracker: Arc::clone(&tracker),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            result: None,
        };
        self.write().insert(id.clone(), run);
        (id, tracker)
    }

    /// Attach the final result to a run.
    pub fn finish(&self, id: &str, result: BulkLoadResult) {
        if let Some(run) = self.write().get_mut(id) {
            run.finished_at = Some(chrono::Utc::now().to_rfc3339());
            run.result = Some(Arc::new(result));
        }
    }

    /// Request cancellation of a run.
    ///
    /// `None` for an unknown id; otherwise whether this call performed the
    /// transition (a repeat abort returns `Some(false)`).
    pub fn abort(&self, id: &str, reason: impl Into<String>) -> Option<bool> {
        let runs = self.read();
        runs.get(id).map(|run| run.tracker.abort(reason))
    }

    /// Snapshot one run for the status endpoint.
    pub fn snapshot(&self, id: &str) -> Option<RunSnapshot> {
        let runs = self.read();
        runs.get(id).map(|run| RunSnapshot {
            id: id.to_string(),
            started_at: run.started_at.clone(),
            finished_at: run.finished_at.clone(),
            progress: run.tracker.progress(),
            result: run.result.clone(),
        })
    }

    /// Ids of every known run.
    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, LoadRun>> {
        self.runs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, LoadRun>> {
        self.runs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LoadRegistry {
    fn default() -> Self {
        Self::new()
    }
}
