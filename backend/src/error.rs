//! Error types for the Entityload ingestion pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`RecordError`] - Bulk input stream errors
//! - [`TrackerError`] - Load state machine misuse
//! - [`EngineError`] - Structured resolution-engine rejections
//! - [`LoadError`] - Top-level bulk-load errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Data-quality problems are not errors: a malformed record is recorded as
//! a statistic (analysis) or a per-record load error (load) and the run
//! continues. Only unreadable input or explicit cancellation ends a run.

use thiserror::Error;

// =============================================================================
// Record Stream Errors
// =============================================================================

/// Errors while reading the bulk input stream.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Input source became unreadable. Fatal to the run.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode input bytes.
    #[error("Failed to decode input: {0}")]
    Encoding(String),

    /// One record could not be parsed. Local to that record.
    #[error("Line {line}: {message}")]
    Malformed { line: usize, message: String },

    /// Empty input.
    #[error("Bulk input is empty")]
    EmptyInput,

    /// CSV input without a header row.
    #[error("No header row found in CSV input")]
    NoHeaders,
}

impl RecordError {
    /// Whether this error terminates the stream (as opposed to one record).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RecordError::Malformed { .. })
    }
}

// =============================================================================
// Tracker Errors
// =============================================================================

/// Load state machine misuse by the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// `start()` on a tracker that already left NOT_STARTED.
    #[error("Load already started (status: {status})")]
    AlreadyStarted { status: &'static str },
}

// =============================================================================
// Engine Errors
// =============================================================================

/// Structured rejection from the resolution engine.
///
/// One per failed record submission; never aborts the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct EngineError {
    /// Stable error code (engine-assigned, or a transport code).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl EngineError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Transport-level failure (connection refused, timeout, bad body).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new("E_TRANSPORT", message)
    }
}

// =============================================================================
// Load Errors (top-level)
// =============================================================================

/// Top-level bulk-load errors.
///
/// Once a load is started it always produces a [`crate::load::BulkLoadResult`],
/// so the only error path out of the loader is caller misuse.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Tracker misuse.
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Load error.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Input stream error.
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for record stream operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Result type for engine submissions.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type for bulk-load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
