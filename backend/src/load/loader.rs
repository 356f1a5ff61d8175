//! Bulk load - the live run.
//!
//! Drives a record stream into the resolution engine one record at a time,
//! folding every per-record outcome into a [`BulkLoadResult`]. A bad record
//! is bookkeeping, not a failure: the run only ends early when the input
//! stream dies or an abort is requested through the tracker.
//!
//! The loop holds no lock across an engine submission; cancellation is
//! checked between records, never mid-record.

use std::collections::HashMap;

use serde::Serialize;

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::classify::{classify, DEFAULT_DATA_SOURCE};
use crate::engine::{EngineRecord, IngestOutcome, ResolutionEngine};
use crate::error::{LoadResult, RecordResult};
use crate::models::{LoadStatus, RecordId};
use crate::parser::{is_reserved_field, RawRecord};

use super::aggregate::{ResolutionAggregator, ResolutionInfo, ResolutionSummary, DEFAULT_RESOLUTION_CAP};
use super::tracker::LoadStatusTracker;

/// Error code for records that never reached the engine.
const MALFORMED_CODE: &str = "E_MALFORMED";

/// Default number of retained per-record load errors.
pub const DEFAULT_ERROR_CAP: usize = 1000;

// =============================================================================
// Options
// =============================================================================

/// Options for one bulk-load run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadOptions {
    /// Data source for records that name none.
    pub default_data_source: String,

    /// Retained resolution entries (totals keep running past it).
    pub resolution_cap: usize,

    /// Retained per-record errors (the failed counter keeps running).
    pub error_cap: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            default_data_source: DEFAULT_DATA_SOURCE.to_string(),
            resolution_cap: DEFAULT_RESOLUTION_CAP,
            error_cap: DEFAULT_ERROR_CAP,
        }
    }
}

// =============================================================================
// Result Types
// =============================================================================

/// Load counters for one data source.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceLoadStat {
    pub data_source: String,
    pub loaded: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// One record that failed to load. Never aborts the run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BulkLoadError {
    /// The failing record.
    #[serde(flatten)]
    pub record: RecordId,
    /// Engine error code, or `E_MALFORMED` for records never submitted.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Terminal aggregate of one bulk-load run.
///
/// `submitted == loaded + skipped + failed` holds at the moment of return.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkLoadResult {
    /// Final run status (COMPLETED, or ABORTED for a partial run).
    pub status: LoadStatus,
    /// Records that entered processing.
    pub submitted: u64,
    /// Records the engine ingested.
    pub loaded: u64,
    /// Records the engine reported as already known.
    pub skipped: u64,
    /// Records that failed (malformed or rejected).
    pub failed: u64,
    /// Per-source counters, in first-seen order.
    pub data_sources: Vec<DataSourceLoadStat>,
    /// Bounded resolution outcome summary.
    pub resolution: ResolutionSummary,
    /// Retained per-record errors, in stream order.
    pub errors: Vec<BulkLoadError>,
    /// Reason attached by the abort, for partial runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl BulkLoadResult {
    /// Whether the run ended before consuming the whole stream.
    pub fn is_partial(&self) -> bool {
        self.status == LoadStatus::Aborted
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Internal accumulation state for one run.
struct LoadAccumulator {
    submitted: u64,
    loaded: u64,
    skipped: u64,
    failed: u64,
    sources: Vec<DataSourceLoadStat>,
    source_index: HashMap<String, usize>,
    errors: Vec<BulkLoadError>,
    error_cap: usize,
    aggregator: ResolutionAggregator,
}

impl LoadAccumulator {
    fn new(options: &LoadOptions) -> Self {
        Self {
            submitted: 0,
            loaded: 0,
            skipped: 0,
            failed: 0,
            sources: Vec::new(),
            source_index: HashMap::new(),
            errors: Vec::new(),
            error_cap: options.error_cap,
            aggregator: ResolutionAggregator::new(options.resolution_cap),
        }
    }

    fn record_loaded(&mut self, info: ResolutionInfo) {
        self.submitted += 1;
        self.loaded += 1;
        self.source_stat(&info.record.data_source).loaded += 1;
        self.aggregator.fold(info);
    }

    fn record_skipped(&mut self, record: &RecordId) {
        self.submitted += 1;
        self.skipped += 1;
        self.source_stat(&record.data_source).skipped += 1;
    }

    fn record_failed(&mut self, record: RecordId, code: String, message: String) {
        self.submitted += 1;
        self.failed += 1;
        self.source_stat(&record.data_source).failed += 1;
        if self.errors.len() < self.error_cap {
            self.errors.push(BulkLoadError {
                record,
                code,
                message,
            });
        }
    }

    fn source_stat(&mut self, data_source: &str) -> &mut DataSourceLoadStat {
        let index = *self
            .source_index
            .entry(data_source.to_string())
            .or_insert_with(|| {
                self.sources.push(DataSourceLoadStat {
                    data_source: data_source.to_string(),
                    loaded: 0,
                    skipped: 0,
                    failed: 0,
                });
                self.sources.len() - 1
            });
        &mut self.sources[index]
    }

    fn finish(self, tracker: &LoadStatusTracker) -> BulkLoadResult {
        BulkLoadResult {
            status: tracker.status(),
            submitted: self.submitted,
            loaded: self.loaded,
            skipped: self.skipped,
            failed: self.failed,
            data_sources: self.sources,
            resolution: self.aggregator.into_summary(),
            errors: self.errors,
            abort_reason: tracker.abort_reason(),
        }
    }
}

/// Run a bulk load to completion, abort, or stream failure.
///
/// Starts the tracker, consumes the stream in arrival order and submits
/// each well-formed record to the engine. Always returns a result once
/// started; the only error path is `start()` on a used tracker.
pub async fn load<E: ResolutionEngine>(
    records: impl Iterator<Item = RecordResult<RawRecord>>,
    engine: &E,
    tracker: &LoadStatusTracker,
    options: &LoadOptions,
) -> LoadResult<BulkLoadResult> {
    tracker.start()?;
    log_info("🚚 Starting bulk load...");

    let mut acc = LoadAccumulator::new(options);
    let mut records = records;

    loop {
        let item = match records.next() {
            Some(item) => item,
            None => break,
        };

        // Cooperative cancellation point, once per record
        if tracker.status() == LoadStatus::Aborted {
            log_warning("Abort requested, stopping load");
            break;
        }

        match item {
            Ok(record) => {
                submit_record(&record, engine, tracker, options, &mut acc).await;
            }
            Err(e) if e.is_fatal() => {
                // The input itself died; nothing further can be read
                log_error(format!("Input stream failed: {}", e));
                tracker.abort(format!("Input stream failed: {}", e));
                break;
            }
            Err(e) => {
                // One unreadable row; count it and keep going
                let line = match e {
                    crate::error::RecordError::Malformed { line, .. } => line,
                    _ => 0,
                };
                let record = RecordId::new(
                    options.default_data_source.to_uppercase(),
                    line.to_string(),
                );
                acc.record_failed(record, MALFORMED_CODE.to_string(), e.to_string());
                tracker.record_processed();
            }
        }
    }

    tracker.complete();
    let result = acc.finish(tracker);

    if result.is_partial() {
        log_warning(format!(
            "Load aborted after {} records ({} loaded, {} skipped, {} failed)",
            result.submitted, result.loaded, result.skipped, result.failed
        ));
    } else {
        log_success(format!(
            "Load complete: {} submitted, {} loaded, {} skipped, {} failed",
            result.submitted, result.loaded, result.skipped, result.failed
        ));
    }

    debug_assert_eq!(
        result.submitted,
        result.loaded + result.skipped + result.failed
    );
    Ok(result)
}

/// Classify one record, submit it, and fold the outcome.
async fn submit_record<E: ResolutionEngine>(
    record: &RawRecord,
    engine: &E,
    tracker: &LoadStatusTracker,
    options: &LoadOptions,
    acc: &mut LoadAccumulator,
) {
    let classification = classify(record, &options.default_data_source);
    // Records without an explicit id borrow their stream position so
    // errors and resolution entries stay correlatable
    let record_id = RecordId::new(
        &classification.data_source,
        record
            .record_id()
            .unwrap_or_else(|| record.position().to_string()),
    );

    if classification.malformed {
        acc.record_failed(
            record_id,
            MALFORMED_CODE.to_string(),
            "Record has no identifiable attributes or invalid structure".to_string(),
        );
        tracker.record_processed();
        return;
    }

    let engine_record = EngineRecord {
        record: record_id.clone(),
        entity_type: classification.entity_type,
        attributes: record
            .fields()
            .iter()
            .filter(|(name, _)| !is_reserved_field(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    };

    match engine.ingest_record(&engine_record).await {
        Ok(IngestOutcome::Loaded { affected, flagged }) => {
            acc.record_loaded(ResolutionInfo::new(record_id, affected, flagged));
        }
        Ok(IngestOutcome::Duplicate) => {
            acc.record_skipped(&record_id);
        }
        Err(e) => {
            acc.record_failed(record_id, e.code, e.message);
        }
    }
    tracker.record_processed();
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, EngineResult, RecordError};
    use crate::models::EntityId;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Engine stub that replays a scripted list of outcomes.
    struct ScriptedEngine {
        outcomes: Mutex<VecDeque<EngineResult<IngestOutcome>>>,
        calls: AtomicU64,
    }

    impl ScriptedEngine {
        fn new(outcomes: Vec<EngineResult<IngestOutcome>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU64::new(0),
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ResolutionEngine for ScriptedEngine {
        async fn ingest_record(&self, _record: &EngineRecord) -> EngineResult<IngestOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(IngestOutcome::Duplicate))
        }
    }

    fn loaded(affected: &[i64], flagged: &[i64]) -> EngineResult<IngestOutcome> {
        Ok(IngestOutcome::Loaded {
            affected: affected.iter().copied().map(EntityId).collect(),
            flagged: flagged.iter().copied().map(EntityId).collect(),
        })
    }

    fn record(position: usize, fields: Value) -> RecordResult<RawRecord> {
        match fields {
            Value::Object(map) => Ok(RawRecord::new(position, map)),
            _ => panic!("expected object"),
        }
    }

    fn two_customers() -> Vec<RecordResult<RawRecord>> {
        vec![
            record(
                1,
                json!({ "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "1", "NAME_FULL": "Alice" }),
            ),
            record(
                2,
                json!({ "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "2", "PHONE_NUMBER": "555-1212" }),
            ),
        ]
    }

    #[tokio::test]
    async fn test_load_counts_and_rejection() {
        let engine = ScriptedEngine::new(vec![
            loaded(&[10], &[]),
            Err(EngineError::new("E100", "rejected by engine")),
        ]);
        let tracker = LoadStatusTracker::new();

        let result = load(
            two_customers().into_iter(),
            &engine,
            &tracker,
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.status, LoadStatus::Completed);
        assert_eq!(result.submitted, 2);
        assert_eq!(result.loaded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.submitted, result.loaded + result.skipped + result.failed);

        assert_eq!(result.errors.len(), 1);
        let error = &result.errors[0];
        assert_eq!(error.record, RecordId::new("CUSTOMERS", "2"));
        assert_eq!(error.code, "E100");
    }

    #[tokio::test]
    async fn test_duplicates_are_skipped() {
        let engine = ScriptedEngine::new(vec![loaded(&[10], &[]), Ok(IngestOutcome::Duplicate)]);
        let tracker = LoadStatusTracker::new();

        let result = load(
            two_customers().into_iter(),
            &engine,
            &tracker,
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.loaded, 1);
        assert_eq!(result.skipped, 1);
        assert!(result.errors.is_empty());
        // No resolution info for duplicates
        assert_eq!(result.resolution.folded, 1);
    }

    #[tokio::test]
    async fn test_abort_before_first_record() {
        let engine = ScriptedEngine::new(vec![]);
        let tracker = LoadStatusTracker::new();

        // Raise the abort while the loader pulls the first item
        let records = two_customers();
        let mut items = records.into_iter();
        let tracker_ref = &tracker;
        let aborting = std::iter::from_fn(move || {
            tracker_ref.abort("cancelled by client");
            items.next()
        });

        let result = load(aborting, &engine, tracker_ref, &LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, LoadStatus::Aborted);
        assert_eq!(result.submitted, 0);
        assert_eq!(result.loaded, 0);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.failed, 0);
        assert_eq!(engine.calls(), 0);
        assert_eq!(result.abort_reason.as_deref(), Some("cancelled by client"));
    }

    #[tokio::test]
    async fn test_abort_mid_stream_is_partial() {
        let engine = ScriptedEngine::new(vec![loaded(&[1], &[]), loaded(&[2], &[])]);
        let tracker = LoadStatusTracker::new();

        let mut produced = 0usize;
        let tracker_ref = &tracker;
        let records = std::iter::from_fn(move || {
            produced += 1;
            if produced == 3 {
                tracker_ref.abort("deadline hit");
            }
            if produced > 10 {
                return None;
            }
            Some(record(
                produced,
                json!({ "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": produced.to_string(), "NAME_FULL": "x" }),
            ))
        });

        let result = load(records, &engine, tracker_ref, &LoadOptions::default())
            .await
            .unwrap();

        assert!(result.is_partial());
        assert_eq!(result.submitted, 2);
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn test_stream_failure_aborts_with_reason() {
        let engine = ScriptedEngine::new(vec![loaded(&[1], &[])]);
        let tracker = LoadStatusTracker::new();

        let items = vec![
            record(1, json!({ "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "1", "NAME_FULL": "a" })),
            Err(RecordError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "disk gone",
            ))),
            record(3, json!({ "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "3", "NAME_FULL": "b" })),
        ];

        let result = load(items.into_iter(), &engine, &tracker, &LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, LoadStatus::Aborted);
        assert_eq!(result.submitted, 1);
        assert!(result.abort_reason.unwrap().contains("disk gone"));
        // The record after the failure was never touched
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_records_never_reach_engine() {
        let engine = ScriptedEngine::new(vec![]);
        let tracker = LoadStatusTracker::new();

        let items = vec![
            record(1, json!({ "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "77" })),
            Err(RecordError::Malformed {
                line: 2,
                message: "Invalid JSON".into(),
            }),
        ];

        let result = load(items.into_iter(), &engine, &tracker, &LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, LoadStatus::Completed);
        assert_eq!(result.submitted, 2);
        assert_eq!(result.failed, 2);
        assert_eq!(engine.calls(), 0);
        assert!(result.errors.iter().all(|e| e.code == "E_MALFORMED"));
        // The parsed-but-empty record keeps its explicit id
        assert_eq!(result.errors[0].record, RecordId::new("CUSTOMERS", "77"));
    }

    #[tokio::test]
    async fn test_record_id_falls_back_to_position() {
        let engine = ScriptedEngine::new(vec![Err(EngineError::new("E1", "nope"))]);
        let tracker = LoadStatusTracker::new();

        let items = vec![record(
            7,
            json!({ "DATA_SOURCE": "CUSTOMERS", "NAME_FULL": "anonymous" }),
        )];
        let result = load(items.into_iter(), &engine, &tracker, &LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(result.errors[0].record, RecordId::new("CUSTOMERS", "7"));
    }

    #[tokio::test]
    async fn test_per_source_stats_first_seen_order() {
        let engine = ScriptedEngine::new(vec![
            loaded(&[1], &[]),
            Ok(IngestOutcome::Duplicate),
            loaded(&[2], &[]),
        ]);
        let tracker = LoadStatusTracker::new();

        let items = vec![
            record(1, json!({ "DATA_SOURCE": "WATCHLIST", "RECORD_ID": "1", "NAME_FULL": "a" })),
            record(2, json!({ "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": "2", "NAME_FULL": "b" })),
            record(3, json!({ "DATA_SOURCE": "WATCHLIST", "RECORD_ID": "3", "NAME_FULL": "c" })),
        ];
        let result = load(items.into_iter(), &engine, &tracker, &LoadOptions::default())
            .await
            .unwrap();

        let order: Vec<&str> = result
            .data_sources
            .iter()
            .map(|s| s.data_source.as_str())
            .collect();
        assert_eq!(order, vec!["WATCHLIST", "CUSTOMERS"]);
        assert_eq!(result.data_sources[0].loaded, 2);
        assert_eq!(result.data_sources[1].skipped, 1);
    }

    #[tokio::test]
    async fn test_resolution_totals_follow_engine() {
        let engine = ScriptedEngine::new(vec![loaded(&[10, 11], &[]), loaded(&[11, 12], &[7])]);
        let tracker = LoadStatusTracker::new();

        let result = load(
            two_customers().into_iter(),
            &engine,
            &tracker,
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.resolution.total_affected, 4);
        assert_eq!(result.resolution.total_flagged, 1);
        assert_eq!(result.resolution.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_error_cap_keeps_failed_counting() {
        let engine = ScriptedEngine::new(
            (0..5)
                .map(|i| Err(EngineError::new("E1", format!("bad {i}"))))
                .collect(),
        );
        let tracker = LoadStatusTracker::new();
        let options = LoadOptions {
            error_cap: 2,
            ..LoadOptions::default()
        };

        let items: Vec<_> = (1..=5)
            .map(|i| {
                record(
                    i,
                    json!({ "DATA_SOURCE": "CUSTOMERS", "RECORD_ID": i.to_string(), "NAME_FULL": "x" }),
                )
            })
            .collect();
        let result = load(items.into_iter(), &engine, &tracker, &options)
            .await
            .unwrap();

        assert_eq!(result.failed, 5);
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_stream_completes() {
        let engine = ScriptedEngine::new(vec![]);
        let tracker = LoadStatusTracker::new();
        let result = load(
            Vec::new().into_iter(),
            &engine,
            &tracker,
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.status, LoadStatus::Completed);
        assert_eq!(result.submitted, 0);
    }

    #[tokio::test]
    async fn test_second_start_is_caller_error() {
        let engine = ScriptedEngine::new(vec![]);
        let tracker = LoadStatusTracker::new();
        load(
            Vec::new().into_iter(),
            &engine,
            &tracker,
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        let err = load(
            Vec::new().into_iter(),
            &engine,
            &tracker,
            &LoadOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("already started"));
    }

    #[tokio::test]
    async fn test_tracker_progress_matches_submitted() {
        let engine = ScriptedEngine::new(vec![loaded(&[1], &[]), loaded(&[2], &[])]);
        let tracker = LoadStatusTracker::new();

        let result = load(
            two_customers().into_iter(),
            &engine,
            &tracker,
            &LoadOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(tracker.records_processed(), result.submitted);
    }
}
