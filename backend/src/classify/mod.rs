//! Record classification.
//!
//! Inspects one raw record and determines its data source, entity type and
//! attribute-class composition. Classification is a pure function: dirty
//! input is reported through the `malformed` flag, never as an error,
//! because analysis must survive arbitrarily bad batches.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::models::{AttributeClass, EntityIdentifier};
use crate::parser::RawRecord;
use crate::validation::is_valid_record;

/// Data source used when a record names none and the caller configured none.
pub const DEFAULT_DATA_SOURCE: &str = "UNKNOWN";

/// Entity type used when a record names none.
pub const DEFAULT_ENTITY_TYPE: &str = "GENERIC";

/// The classifier's verdict on one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Explicit data source, or the configured default.
    pub data_source: String,
    /// Explicit entity type, or `GENERIC`.
    pub entity_type: String,
    /// Attribute classes present in the record. Empty when malformed.
    pub classes: BTreeSet<AttributeClass>,
    /// No identifiable attributes, or the record fails structural parsing.
    pub malformed: bool,
}

/// Classify one raw record.
///
/// `default_data_source` is used when the record carries no explicit
/// `DATA_SOURCE`; pass [`DEFAULT_DATA_SOURCE`] when nothing is configured.
pub fn classify(record: &RawRecord, default_data_source: &str) -> Classification {
    let data_source = record
        .data_source()
        .map(|s| s.to_uppercase())
        .unwrap_or_else(|| default_data_source.to_uppercase());
    let entity_type = record
        .entity_type()
        .map(|s| s.to_uppercase())
        .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string());

    let structurally_valid = is_valid_record(&Value::Object(record.fields().clone()));
    let malformed =
        !record.has_attributes() || !structurally_valid || !relationship_targets_parse(record);

    let classes = if malformed {
        BTreeSet::new()
    } else {
        record
            .attribute_names()
            .map(AttributeClass::from_attribute_name)
            .collect()
    };

    Classification {
        data_source,
        entity_type,
        classes,
        malformed,
    }
}

/// Relationship pointers must name their target in one of the two
/// identifier shapes (entity id, or `SOURCE:ID` record key).
fn relationship_targets_parse(record: &RawRecord) -> bool {
    record
        .fields()
        .iter()
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case("REL_POINTER_KEY"))
        .all(|(_, value)| {
            value
                .as_str()
                .and_then(EntityIdentifier::parse)
                .is_some()
        })
}
