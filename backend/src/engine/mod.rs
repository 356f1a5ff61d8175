//! Resolution engine interface.
//!
//! The entity-resolution engine is an external collaborator reached through
//! one narrow operation: submit a classified record, get back what it did
//! to the entity space. Its matching logic is a black box here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entityload::engine::{HttpEngineClient, ResolutionEngine};
//!
//! let engine = HttpEngineClient::from_env()?;
//! let outcome = engine.ingest_record(&record).await?;
//! ```

pub mod client;

use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::EngineResult;
use crate::models::{EntityId, RecordId};

pub use client::HttpEngineClient;

/// One record, classified and ready for submission.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineRecord {
    /// Composite record key.
    #[serde(flatten)]
    pub record: RecordId,
    /// Entity type the record describes.
    pub entity_type: String,
    /// The record's attributes, reserved fields excluded.
    pub attributes: Map<String, Value>,
}

/// What the engine did with one submitted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The record was ingested.
    Loaded {
        /// Entities whose resolved state changed.
        affected: Vec<EntityId>,
        /// Entities whose resolution became ambiguous or conflicting.
        flagged: Vec<EntityId>,
    },
    /// The record was already known; nothing changed.
    Duplicate,
}

/// The per-record ingestion operation.
///
/// Submissions within one run are sequential by contract: the engine keeps
/// its own consistency across records of a run, so callers must not fan
/// out concurrent submissions for the same run.
pub trait ResolutionEngine {
    /// Submit one record. A rejection is a value, not a panic: the caller
    /// records it and moves on.
    fn ingest_record(
        &self,
        record: &EngineRecord,
    ) -> impl Future<Output = EngineResult<IngestOutcome>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_record_serialization() {
        let mut attributes = Map::new();
        attributes.insert("NAME_FULL".into(), json!("Alice Example"));
        let record = EngineRecord {
            record: RecordId::new("CUSTOMERS", "1070"),
            entity_type: "GENERIC".into(),
            attributes,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["dataSource"], "CUSTOMERS");
        assert_eq!(value["recordId"], "1070");
        assert_eq!(value["entityType"], "GENERIC");
        assert_eq!(value["attributes"]["NAME_FULL"], "Alice Example");
    }
}
