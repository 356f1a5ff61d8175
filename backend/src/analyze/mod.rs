//! Bulk analysis - the dry run.
//!
//! Streams a batch once, classifies every record and accumulates
//! per-data-source and per-entity-type statistics without ever touching
//! the resolution engine. The output tells a client what a load *would*
//! ingest: which sources, which entity types, how much of it is junk.
//!
//! Analysis is advisory, so nothing here fails a run: malformed records
//! are counted, a cancelled or dying stream just yields a snapshot with
//! `complete = false`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::classify::{classify, Classification};
use crate::error::RecordResult;
use crate::models::AttributeClassCounts;
use crate::parser::RawRecord;

// =============================================================================
// Statistics
// =============================================================================

/// Counters for one data source, owned by a single analysis run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceStat {
    /// Data source code (explicit or defaulted).
    pub data_source: String,
    /// Records attributed to this source.
    pub record_count: u64,
    /// Of those, records flagged malformed.
    pub malformed_count: u64,
    /// Attribute classes seen across the source's well-formed records.
    pub classes: AttributeClassCounts,
}

/// Counters for one entity type, owned by a single analysis run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeStat {
    /// Entity type code (explicit or `GENERIC`).
    pub entity_type: String,
    /// Records attributed to this type.
    pub record_count: u64,
    /// Of those, records flagged malformed.
    pub malformed_count: u64,
    /// Attribute classes seen across the type's well-formed records.
    pub classes: AttributeClassCounts,
}

/// Immutable snapshot produced at the end of an analysis run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BulkAnalysis {
    /// Every record seen, malformed ones included.
    pub total_records: u64,
    /// Records with no identifiable attributes or broken structure.
    pub malformed_records: u64,
    /// Per-source statistics, in first-seen order.
    pub data_sources: Vec<DataSourceStat>,
    /// Per-entity-type statistics, in first-seen order.
    pub entity_types: Vec<EntityTypeStat>,
    /// False when the stream was cancelled or died before exhaustion.
    pub complete: bool,
}

// =============================================================================
// Analyzer
// =============================================================================

/// Accumulates statistics over one record stream.
///
/// Stats are keyed by data source and entity type in first-seen order, so
/// the same input in the same order always produces the same output.
pub struct BulkAnalyzer {
    default_data_source: String,
    total: u64,
    malformed: u64,
    sources: Vec<DataSourceStat>,
    source_index: HashMap<String, usize>,
    types: Vec<EntityTypeStat>,
    type_index: HashMap<String, usize>,
}

impl BulkAnalyzer {
    pub fn new(default_data_source: impl Into<String>) -> Self {
        Self {
            default_data_source: default_data_source.into().to_uppercase(),
            total: 0,
            malformed: 0,
            sources: Vec::new(),
            source_index: HashMap::new(),
            types: Vec::new(),
            type_index: HashMap::new(),
        }
    }

    /// Fold one parsed record into the running statistics.
    pub fn observe(&mut self, record: &RawRecord) {
        let classification = classify(record, &self.default_data_source);
        self.observe_classified(&classification);
    }

    /// Fold an already-classified record.
    pub fn observe_classified(&mut self, classification: &Classification) {
        self.total += 1;
        if classification.malformed {
            self.malformed += 1;
        }

        let source = self.source_stat(&classification.data_source);
        source.record_count += 1;
        if classification.malformed {
            source.malformed_count += 1;
        } else {
            for class in &classification.classes {
                source.classes.bump(*class);
            }
        }

        let entity_type = self.type_stat(&classification.entity_type);
        entity_type.record_count += 1;
        if classification.malformed {
            entity_type.malformed_count += 1;
        } else {
            for class in &classification.classes {
                entity_type.classes.bump(*class);
            }
        }
    }

    /// Fold a record that never parsed (an unreadable line).
    ///
    /// It would have landed in the default buckets anyway, so it is counted
    /// there: total, malformed, default source, default entity type.
    pub fn observe_unparsable(&mut self) {
        let default_source = self.default_data_source.clone();
        self.total += 1;
        self.malformed += 1;
        let source = self.source_stat(&default_source);
        source.record_count += 1;
        source.malformed_count += 1;
        let entity_type = self.type_stat(crate::classify::DEFAULT_ENTITY_TYPE);
        entity_type.record_count += 1;
        entity_type.malformed_count += 1;
    }

    /// Consume the analyzer into its snapshot.
    pub fn finish(self, complete: bool) -> BulkAnalysis {
        BulkAnalysis {
            total_records: self.total,
            malformed_records: self.malformed,
            data_sources: self.sources,
            entity_types: self.types,
            complete,
        }
    }

    fn source_stat(&mut self, data_source: &str) -> &mut DataSourceStat {
        let index = *self
            .source_index
            .entry(data_source.to_string())
            .or_insert_with(|| {
                self.sources.push(DataSourceStat {
                    data_source: data_source.to_string(),
                    record_count: 0,
                    malformed_count: 0,
                    classes: AttributeClassCounts::default(),
                });
                self.sources.len() - 1
            });
        &mut self.sources[index]
    }

    fn type_stat(&mut self, entity_type: &str) -> &mut EntityTypeStat {
        let index = *self
            .type_index
            .entry(entity_type.to_string())
            .or_insert_with(|| {
                self.types.push(EntityTypeStat {
                    entity_type: entity_type.to_string(),
                    record_count: 0,
                    malformed_count: 0,
                    classes: AttributeClassCounts::default(),
                });
                self.types.len() - 1
            });
        &mut self.types[index]
    }
}

// =============================================================================
// Drivers
// =============================================================================

/// Analyze a record stream to exhaustion.
pub fn analyze(
    records: impl Iterator<Item = RecordResult<RawRecord>>,
    default_data_source: &str,
) -> BulkAnalysis {
    static NEVER: AtomicBool = AtomicBool::new(false);
    analyze_until(records, default_data_source, &NEVER)
}

/// Analyze a record stream, stopping early when `cancel` is raised.
///
/// The flag is checked between records; a snapshot of everything consumed
/// so far is returned with `complete = false`. A fatal stream error ends
/// the run the same way - partial analysis beats no analysis.
pub fn analyze_until(
    records: impl Iterator<Item = RecordResult<RawRecord>>,
    default_data_source: &str,
    cancel: &AtomicBool,
) -> BulkAnalysis {
    let mut analyzer = BulkAnalyzer::new(default_data_source);

    for item in records {
        if cancel.load(Ordering::Acquire) {
            return analyzer.finish(false);
        }
        match item {
            Ok(record) => analyzer.observe(&record),
            Err(e) if e.is_fatal() => return analyzer.finish(false),
            Err(_) => analyzer.observe_unparsable(),
        }
    }

    analyzer.finish(true)
}

// =============================================================================
// Tests
// =============================================================================
