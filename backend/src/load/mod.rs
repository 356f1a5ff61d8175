//! Bulk load module.
//!
//! This module drives the live ingestion of a batch:
//! - Tracker: per-run state machine and progress counters
//! - Aggregate: bounded resolution-outcome aggregation
//! - Loader: the record-by-record load loop

pub mod aggregate;
pub mod loader;
pub mod tracker;

pub use aggregate::*;
pub use loader::*;
pub use tracker::*;
