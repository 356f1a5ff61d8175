//! REST API types for client integration.
//!
//! Thin camelCase envelopes around the pipeline's own result types. The
//! core produces [`BulkAnalysis`] and [`BulkLoadResult`]; these wrappers
//! add job ids and submission metadata without reshaping the payloads.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::analyze::BulkAnalysis;
use crate::load::BulkLoadResult;
use crate::parser::ParsedBatch;
use crate::runs::RunSnapshot;

/// Response to a bulk analysis request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// Unique job identifier
    pub job_id: String,

    /// "ok", or "partial" when the stream ended early
    pub status: String,

    /// The analysis itself
    pub analysis: BulkAnalysis,

    /// What was detected about the submission
    pub metadata: BatchMetadata,
}

/// Detection metadata for one bulk submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    pub format: String,
    pub encoding: String,
    pub delimiter: Option<String>,
    pub columns: Vec<String>,
}

impl BatchMetadata {
    pub fn from_batch(batch: &ParsedBatch) -> Self {
        Self {
            format: batch.format.as_str().to_string(),
            encoding: batch.encoding.clone(),
            delimiter: batch.delimiter.map(|d| d.to_string()),
            columns: batch.headers.clone(),
        }
    }
}

impl AnalysisResponse {
    pub fn new(analysis: BulkAnalysis, batch: &ParsedBatch) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: if analysis.complete { "ok" } else { "partial" }.to_string(),
            analysis,
            metadata: BatchMetadata::from_batch(batch),
        }
    }
}

/// Response to a bulk load request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    /// Job identifier, also usable with the status and abort endpoints
    pub job_id: String,

    /// Final LoadStatus wire name ("COMPLETED", "ABORTED")
    pub status: String,

    /// The full load outcome
    pub result: BulkLoadResult,
}

impl LoadResponse {
    pub fn new(job_id: String, result: BulkLoadResult) -> Self {
        Self {
            job_id,
            status: result.status.as_str().to_string(),
            result,
        }
    }
}

/// Response to a load status poll.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub job_id: String,

    /// Current LoadStatus wire name
    pub status: String,

    pub records_processed: u64,

    pub started_at: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,

    /// Present once the run finished and its result was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BulkLoadResult>,
}

impl From<RunSnapshot> for ProgressResponse {
    fn from(snapshot: RunSnapshot) -> Self {
        Self {
            job_id: snapshot.id,
            status: snapshot.progress.status.as_str().to_string(),
            records_processed: snapshot.progress.records_processed,
            started_at: snapshot.started_at,
            finished_at: snapshot.finished_at,
            result: snapshot.result.map(|r| (*r).clone()),
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::analyze;
    use crate::classify::DEFAULT_DATA_SOURCE;
    use crate::parser::parse_bytes_auto;

    #[test]
    fn test_analysis_response_shape() {
        let csv = "DATA_SOURCE,RECORD_ID,NAME_FULL\nCUSTOMERS,1,Alice\nCUSTOMERS,2,Bob";
        let batch = parse_bytes_auto(csv.as_bytes()).unwrap();
        let analysis = analyze(batch.records(), DEFAULT_DATA_SOURCE);

        let response = AnalysisResponse::new(analysis, &batch);
        assert_eq!(response.status, "ok");

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["analysis"]["totalRecords"], 2);
        assert_eq!(value["analysis"]["malformedRecords"], 0);
        assert_eq!(value["analysis"]["dataSources"][0]["dataSource"], "CUSTOMERS");
        assert_eq!(value["metadata"]["format"], "CSV");
        assert_eq!(value["metadata"]["delimiter"], ",");
    }

    #[test]
    fn test_error_response_shape() {
        let value = error_response("boom");
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "boom");
        assert!(value["jobId"].is_string());
    }
}
