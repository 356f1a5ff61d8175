//! Domain models for the Entityload ingestion pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`RecordId`] - Composite record key (data source + record id)
//! - [`EntityId`] - Engine-assigned resolved entity identifier
//! - [`EntityIdentifier`] - Parsed entity-or-record identifier text
//! - [`AttributeClass`] - Closed attribute taxonomy for statistics
//! - [`AttributeClassCounts`] - Per-class histogram
//! - [`LoadStatus`] - Bulk-load state machine states

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// =============================================================================
// Record Identification
// =============================================================================

/// Composite key uniquely naming a record within a data source.
///
/// Used to correlate a submitted record with its resolution outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct RecordId {
    /// Data source code (e.g. "CUSTOMERS").
    pub data_source: String,
    /// Record identifier within the data source.
    pub record_id: String,
}

impl RecordId {
    pub fn new(data_source: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            record_id: record_id.into(),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.data_source, self.record_id)
    }
}

// =============================================================================
// Entity Identification
// =============================================================================

/// Identifier the resolution engine assigns to a resolved entity.
///
/// The pipeline only observes these; it never creates them.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An identifier that names either a resolved entity or a single record.
///
/// Clients reference both through one text form: a plain integer is an
/// entity id, `SOURCE:ID` is a record key. [`EntityIdentifier::parse`]
/// decides between the two concrete shapes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum EntityIdentifier {
    /// A resolved entity, by engine-assigned id.
    Entity(EntityId),
    /// A single record, by (data source, record id).
    Record(RecordId),
}

static ENTITY_ID_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,19}$").expect("invalid entity id pattern"));

impl EntityIdentifier {
    /// Parse an identifier from its text form.
    ///
    /// Returns `None` when the text is neither a plain integer nor a
    /// `SOURCE:ID` pair with a non-empty source.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if ENTITY_ID_FORM.is_match(trimmed) {
            return trimmed.parse::<i64>().ok().map(|id| Self::Entity(EntityId(id)));
        }
        match trimmed.split_once(':') {
            Some((source, id)) if !source.trim().is_empty() && !id.trim().is_empty() => {
                Some(Self::Record(RecordId::new(source.trim(), id.trim())))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Attribute Taxonomy
// =============================================================================

/// Classification bucket for one record attribute.
///
/// A closed taxonomy: every attribute name maps to exactly one class, with
/// [`AttributeClass::Other`] as the catch-all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeClass {
    Address,
    Characteristic,
    Identifier,
    Name,
    Observation,
    Phone,
    Relationship,
    Other,
}

/// Full attribute names classified as characteristics regardless of prefix.
const CHARACTERISTIC_NAMES: &[&str] = &[
    "DATE_OF_BIRTH",
    "DATE_OF_DEATH",
    "GENDER",
    "NATIONALITY",
    "CITIZENSHIP",
    "PLACE_OF_BIRTH",
    "HEIGHT",
    "WEIGHT",
    "EYE_COLOR",
    "HAIR_COLOR",
];

/// Name segments marking an identifier attribute (SSN_NUMBER,
/// PASSPORT_NUMBER, NATIONAL_ID_NUMBER, OTHER_ID_TYPE, ...).
const IDENTIFIER_SEGMENTS: &[&str] = &[
    "ID", "SSN", "PASSPORT", "LICENSE", "DUNS", "LEI", "NPI", "ACCOUNT",
];

impl AttributeClass {
    /// Classify an attribute by its name.
    ///
    /// Names follow the `CLASS_DETAIL` convention (`ADDR_LINE1`,
    /// `PHONE_NUMBER`, `NAME_FULL`); anything unrecognized is [`Self::Other`].
    pub fn from_attribute_name(name: &str) -> Self {
        let upper = name.trim().to_uppercase();
        let segments: Vec<&str> = upper.split('_').filter(|s| !s.is_empty()).collect();
        let first = segments.first().copied().unwrap_or("");

        match first {
            "ADDR" | "ADDRESS" => return Self::Address,
            "REL" | "RELATIONSHIP" => return Self::Relationship,
            _ => {}
        }
        if segments.contains(&"NAME") {
            return Self::Name;
        }
        if segments.contains(&"PHONE") {
            return Self::Phone;
        }
        if segments.iter().any(|s| IDENTIFIER_SEGMENTS.contains(s)) {
            return Self::Identifier;
        }
        if CHARACTERISTIC_NAMES.contains(&upper.as_str()) || first == "DOB" {
            return Self::Characteristic;
        }
        if matches!(first, "DATE" | "TIME" | "STATUS" | "AMOUNT" | "QUANTITY" | "SEEN") {
            return Self::Observation;
        }
        Self::Other
    }

    /// Stable wire name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Address => "ADDRESS",
            Self::Characteristic => "CHARACTERISTIC",
            Self::Identifier => "IDENTIFIER",
            Self::Name => "NAME",
            Self::Observation => "OBSERVATION",
            Self::Phone => "PHONE",
            Self::Relationship => "RELATIONSHIP",
            Self::Other => "OTHER",
        }
    }
}

/// Histogram of attribute classes seen in a group of records.
///
/// One counter per class keeps the shape closed: adding a class without
/// touching the histogram is a compile error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeClassCounts {
    pub address: u64,
    pub characteristic: u64,
    pub identifier: u64,
    pub name: u64,
    pub observation: u64,
    pub phone: u64,
    pub relationship: u64,
    pub other: u64,
}

impl AttributeClassCounts {
    /// Increment the counter for one class.
    pub fn bump(&mut self, class: AttributeClass) {
        match class {
            AttributeClass::Address => self.address += 1,
            AttributeClass::Characteristic => self.characteristic += 1,
            AttributeClass::Identifier => self.identifier += 1,
            AttributeClass::Name => self.name += 1,
            AttributeClass::Observation => self.observation += 1,
            AttributeClass::Phone => self.phone += 1,
            AttributeClass::Relationship => self.relationship += 1,
            AttributeClass::Other => self.other += 1,
        }
    }

    /// Sum over all classes.
    pub fn total(&self) -> u64 {
        self.address
            + self.characteristic
            + self.identifier
            + self.name
            + self.observation
            + self.phone
            + self.relationship
            + self.other
    }
}

// =============================================================================
// Load Status
// =============================================================================

/// State of one bulk-load run.
///
/// Transitions are monotonic: NOT_STARTED → IN_PROGRESS → {ABORTED,
/// COMPLETED}, and the terminal states are sticky. The wire names are
/// observed by polling clients and must stay stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    NotStarted,
    InProgress,
    Aborted,
    Completed,
}

impl LoadStatus {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Aborted => "ABORTED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Whether the run can make no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aborted | Self::Completed)
    }

    /// Encoding for the tracker's atomic status field.
    pub(crate) fn as_u8(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Aborted => 2,
            Self::Completed => 3,
        }
    }

    /// Inverse of [`Self::as_u8`]. Unknown values collapse to NOT_STARTED,
    /// which cannot happen for values written by the tracker.
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::InProgress,
            2 => Self::Aborted,
            3 => Self::Completed,
            _ => Self::NotStarted,
        }
    }
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_identifier_parse_entity_form() {
        assert_eq!(
            EntityIdentifier::parse("42"),
            Some(EntityIdentifier::Entity(EntityId(42)))
        );
        assert_eq!(
            EntityIdentifier::parse("  1001 "),
            Some(EntityIdentifier::Entity(EntityId(1001)))
        );
    }

    #[test]
    fn test_entity_identifier_parse_record_form() {
        assert_eq!(
            EntityIdentifier::parse("CUSTOMERS:1070"),
            Some(EntityIdentifier::Record(RecordId::new("CUSTOMERS", "1070")))
        );
        // Record ids themselves may be numeric-looking once a source is given
        assert_eq!(
            EntityIdentifier::parse("WATCHLIST: 88 "),
            Some(EntityIdentifier::Record(RecordId::new("WATCHLIST", "88")))
        );
    }

    #[test]
    fn test_entity_identifier_parse_rejects_garbage() {
        assert_eq!(EntityIdentifier::parse(""), None);
        assert_eq!(EntityIdentifier::parse("   "), None);
        assert_eq!(EntityIdentifier::parse(":1070"), None);
        assert_eq!(EntityIdentifier::parse("CUSTOMERS:"), None);
        assert_eq!(EntityIdentifier::parse("not an id"), None);
    }

    #[test]
    fn test_attribute_class_from_name() {
        use AttributeClass::*;
        assert_eq!(AttributeClass::from_attribute_name("ADDR_LINE1"), Address);
        assert_eq!(AttributeClass::from_attribute_name("addr_city"), Address);
        assert_eq!(AttributeClass::from_attribute_name("NAME_FULL"), Name);
        assert_eq!(AttributeClass::from_attribute_name("PRIMARY_NAME_ORG"), Name);
        assert_eq!(AttributeClass::from_attribute_name("PHONE_NUMBER"), Phone);
        assert_eq!(AttributeClass::from_attribute_name("CELL_PHONE_NUMBER"), Phone);
        assert_eq!(AttributeClass::from_attribute_name("SSN_NUMBER"), Identifier);
        assert_eq!(
            AttributeClass::from_attribute_name("NATIONAL_ID_NUMBER"),
            Identifier
        );
        assert_eq!(
            AttributeClass::from_attribute_name("DATE_OF_BIRTH"),
            Characteristic
        );
        assert_eq!(AttributeClass::from_attribute_name("GENDER"), Characteristic);
        assert_eq!(
            AttributeClass::from_attribute_name("REL_ANCHOR_KEY"),
            Relationship
        );
        assert_eq!(AttributeClass::from_attribute_name("DATE_SEEN"), Observation);
        assert_eq!(AttributeClass::from_attribute_name("FAVORITE_COLOR"), Other);
    }

    #[test]
    fn test_attribute_class_counts_bump() {
        let mut counts = AttributeClassCounts::default();
        counts.bump(AttributeClass::Name);
        counts.bump(AttributeClass::Name);
        counts.bump(AttributeClass::Phone);
        assert_eq!(counts.name, 2);
        assert_eq!(counts.phone, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_load_status_wire_names() {
        assert_eq!(LoadStatus::NotStarted.as_str(), "NOT_STARTED");
        assert_eq!(LoadStatus::InProgress.as_str(), "IN_PROGRESS");
        assert_eq!(LoadStatus::Aborted.as_str(), "ABORTED");
        assert_eq!(LoadStatus::Completed.as_str(), "COMPLETED");

        let json = serde_json::to_string(&LoadStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn test_load_status_u8_roundtrip() {
        for status in [
            LoadStatus::NotStarted,
            LoadStatus::InProgress,
            LoadStatus::Aborted,
            LoadStatus::Completed,
        ] {
            assert_eq!(LoadStatus::from_u8(status.as_u8()), status);
        }
        assert!(LoadStatus::Aborted.is_terminal());
        assert!(LoadStatus::Completed.is_terminal());
        assert!(!LoadStatus::InProgress.is_terminal());
    }
}
