//! Aggregation of per-record resolution outcomes.
//!
//! A batch of millions of records would produce millions of
//! [`ResolutionInfo`] entries, so the aggregator keeps a fixed-capacity
//! collection plus scalar running totals: the first `cap` folds retain
//! their entry, later folds only advance the totals. The totals are
//! accurate for the whole run either way.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::{EntityId, RecordId};

/// Default number of retained resolution entries per run.
pub const DEFAULT_RESOLUTION_CAP: usize = 1000;

// =============================================================================
// Resolution Info
// =============================================================================

/// Resolution side effects of ingesting one record.
///
/// Entity ids are sets: within one record an id counts once no matter how
/// often the engine mentions it. Across records nothing is collapsed - the
/// same entity may legitimately be affected by many records in one run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionInfo {
    /// The record that caused the effects.
    #[serde(flatten)]
    pub record: RecordId,
    /// Entities whose resolved state changed.
    pub affected_entities: BTreeSet<EntityId>,
    /// Entities whose resolution became ambiguous or conflicting.
    pub flagged_entities: BTreeSet<EntityId>,
}

impl ResolutionInfo {
    pub fn new(
        record: RecordId,
        affected: impl IntoIterator<Item = EntityId>,
        flagged: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        Self {
            record,
            affected_entities: affected.into_iter().collect(),
            flagged_entities: flagged.into_iter().collect(),
        }
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Folds many [`ResolutionInfo`] values into a bounded summary.
pub struct ResolutionAggregator {
    cap: usize,
    entries: Vec<ResolutionInfo>,
    folded: u64,
    total_affected: u64,
    total_flagged: u64,
}

/// The bounded, immutable result of one aggregation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSummary {
    /// Retained entries, in fold order. At most `cap` of them.
    pub entries: Vec<ResolutionInfo>,
    /// Every fold, retained or not.
    pub folded: u64,
    /// Affected-entity count over all folds (per-record, not global, dedup).
    pub total_affected: u64,
    /// Flagged-entity count over all folds.
    pub total_flagged: u64,
}

impl ResolutionSummary {
    /// Whether folds beyond the cap were dropped from `entries`.
    pub fn truncated(&self) -> bool {
        self.folded > self.entries.len() as u64
    }
}

impl ResolutionAggregator {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: Vec::new(),
            folded: 0,
            total_affected: 0,
            total_flagged: 0,
        }
    }

    pub fn with_default_cap() -> Self {
        Self::new(DEFAULT_RESOLUTION_CAP)
    }

    /// Fold one record's outcome into the aggregate.
    pub fn fold(&mut self, info: ResolutionInfo) {
        self.folded += 1;
        self.total_affected += info.affected_entities.len() as u64;
        self.total_flagged += info.flagged_entities.len() as u64;
        if self.entries.len() < self.cap {
            self.entries.push(info);
        }
    }

    /// Snapshot the current aggregate without consuming the aggregator.
    pub fn snapshot(&self) -> ResolutionSummary {
        ResolutionSummary {
            entries: self.entries.clone(),
            folded: self.folded,
            total_affected: self.total_affected,
            total_flagged: self.total_flagged,
        }
    }

    /// Consume the aggregator into its final summary.
    pub fn into_summary(self) -> ResolutionSummary {
        ResolutionSummary {
            entries: self.entries,
            folded: self.folded,
            total_affected: self.total_affected,
            total_flagged: self.total_flagged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(record_id: &str, affected: &[i64], flagged: &[i64]) -> ResolutionInfo {
        ResolutionInfo::new(
            RecordId::new("CUSTOMERS", record_id),
            affected.iter().copied().map(EntityId),
            flagged.iter().copied().map(EntityId),
        )
    }

    #[test]
    fn test_totals_count_per_record() {
        let mut agg = ResolutionAggregator::with_default_cap();
        agg.fold(info("1", &[10, 11], &[]));
        agg.fold(info("2", &[11, 12], &[]));

        let summary = agg.into_summary();
        // Entity 11 appears in both records and counts twice
        assert_eq!(summary.total_affected, 4);
        assert_eq!(summary.entries.len(), 2);
        assert!(!summary.truncated());
    }

    #[test]
    fn test_in_record_duplicates_collapse() {
        let rec = ResolutionInfo::new(
            RecordId::new("CUSTOMERS", "1"),
            [EntityId(10), EntityId(10), EntityId(11)],
            [EntityId(7), EntityId(7)],
        );
        assert_eq!(rec.affected_entities.len(), 2);
        assert_eq!(rec.flagged_entities.len(), 1);

        let mut agg = ResolutionAggregator::with_default_cap();
        agg.fold(rec);
        let summary = agg.into_summary();
        assert_eq!(summary.total_affected, 2);
        assert_eq!(summary.total_flagged, 1);
    }

    #[test]
    fn test_cap_keeps_totals_running() {
        let mut agg = ResolutionAggregator::new(3);
        for i in 0..5 {
            agg.fold(info(&i.to_string(), &[i], &[100 + i]));
        }

        let summary = agg.into_summary();
        assert_eq!(summary.entries.len(), 3);
        assert_eq!(summary.folded, 5);
        assert_eq!(summary.total_affected, 5);
        assert_eq!(summary.total_flagged, 5);
        assert!(summary.truncated());

        // Retained entries are the earliest folds, in order
        let ids: Vec<&str> = summary
            .entries
            .iter()
            .map(|e| e.record.record_id.as_str())
            .collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_snapshot_mid_run() {
        let mut agg = ResolutionAggregator::new(2);
        agg.fold(info("1", &[1], &[]));
        let early = agg.snapshot();
        agg.fold(info("2", &[2], &[]));

        assert_eq!(early.folded, 1);
        assert_eq!(agg.snapshot().folded, 2);
    }

    #[test]
    fn test_serialization_shape() {
        let summary = {
            let mut agg = ResolutionAggregator::new(10);
            agg.fold(info("1070", &[10], &[7]));
            agg.into_summary()
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["entries"][0]["dataSource"], "CUSTOMERS");
        assert_eq!(value["entries"][0]["recordId"], "1070");
        assert_eq!(value["entries"][0]["affectedEntities"][0], 10);
        assert_eq!(value["totalAffected"], 1);
        assert_eq!(value["totalFlagged"], 1);
    }
}
