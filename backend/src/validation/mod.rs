//! JSON Schema validation for bulk entity records.
//!
//! This module provides the structural half of the "malformed" decision:
//! a record whose shape fails the embedded schema cannot be submitted to
//! the resolution engine and is counted instead of loaded.
//!
//! # Record Shape
//!
//! - Reserved fields: `DATA_SOURCE` (string), `RECORD_ID` (string or
//!   number), `ENTITY_TYPE` (string), `LOAD_ID`
//! - Attributes: scalar values, or one level of attribute lists (an array
//!   of flat objects, e.g. several addresses)
//! - Deeper nesting is rejected as unparsable structure
//!
//! # Embedded Schema
//!
//! The schema is embedded at compile time from `schemas/bulk-record.json`
//! (JSON Schema Draft 7).
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use entityload::validation::is_valid_record;
//!
//! let record = json!({
//!     "DATA_SOURCE": "CUSTOMERS",
//!     "RECORD_ID": "1070",
//!     "NAME_FULL": "Alice Example"
//! });
//! assert!(is_valid_record(&record));
//! ```

use serde_json::Value;

/// Validate a JSON object against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with the validation errors otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Boolean-only variant of [`validate`].
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate one raw record against the bulk-record schema.
pub fn validate_record(data: &Value) -> Result<(), Vec<String>> {
    let schema: Value = serde_json::from_str(include_str!("../../schemas/bulk-record.json"))
        .expect("Invalid embedded schema");
    validate(&schema, data)
}

/// Quick check against the bulk-record schema.
pub fn is_valid_record(data: &Value) -> bool {
    let schema: Value = serde_json::from_str(include_str!("../../schemas/bulk-record.json"))
        .expect("Invalid embedded schema");
    is_valid(&schema, data)
}
