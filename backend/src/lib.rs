//! # Entityload - Bulk entity-record analysis and loading
//!
//! Entityload streams bulk collections of entity records (names, addresses,
//! identifiers, phones, relationships) into an entity-resolution engine,
//! reporting both a structural analysis of the batch and the outcome of
//! loading it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────────────────┐
//! │  Bulk File  │────▶│   Parser    │────▶│ Analyzer (dry run, stats)    │
//! │ (CSV/JSONL) │     │ (auto-enc)  │     │ Loader   (engine, tracked)   │
//! └─────────────┘     └─────────────┘     └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use entityload::{analyze, parse_bytes_auto};
//!
//! let batch = parse_bytes_auto(&bytes)?;
//! let analysis = analyze(batch.records(), "CUSTOMERS");
//! println!("{} records, {} malformed", analysis.total_records, analysis.malformed_records);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (RecordId, EntityId, AttributeClass, LoadStatus)
//! - [`parser`] - Bulk input parsing with auto-detection
//! - [`classify`] - Per-record classification
//! - [`analyze`] - Bulk analysis (dry run)
//! - [`engine`] - Resolution engine interface and HTTP client
//! - [`load`] - Bulk load, status tracking, resolution aggregation
//! - [`runs`] - Load run registry
//! - [`validation`] - Record schema validation
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Input
pub mod parser;

// Classification & analysis
pub mod analyze;
pub mod classify;

// Engine
pub mod engine;

// Load
pub mod load;
pub mod runs;

// Validation
pub mod validation;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{EngineError, LoadError, RecordError, ServerError, TrackerError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AttributeClass,
    AttributeClassCounts,
    EntityId,
    EntityIdentifier,
    LoadStatus,
    RecordId,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content,
    detect_delimiter,
    detect_encoding,
    detect_format,
    parse_bytes_auto,
    BulkFormat,
    ParsedBatch,
    RawRecord,
    RecordIter,
};

// =============================================================================
// Re-exports - Classification & Analysis
// =============================================================================

pub use analyze::{analyze, analyze_until, BulkAnalysis, BulkAnalyzer, DataSourceStat, EntityTypeStat};
pub use classify::{classify, Classification};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use engine::{EngineRecord, HttpEngineClient, IngestOutcome, ResolutionEngine};

// =============================================================================
// Re-exports - Load
// =============================================================================

pub use load::{
    load,
    BulkLoadError,
    BulkLoadResult,
    DataSourceLoadStat,
    LoadOptions,
    LoadProgress,
    LoadStatusTracker,
    ResolutionAggregator,
    ResolutionInfo,
    ResolutionSummary,
};

// =============================================================================
// Re-exports - Runs
// =============================================================================

pub use runs::{LoadRegistry, RunSnapshot, LOAD_REGISTRY};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, is_valid_record, validate, validate_record};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, AnalysisResponse, BatchMetadata, LoadResponse, ProgressResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
