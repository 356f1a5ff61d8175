//! HTTP client for the resolution engine.
//!
//! Speaks the engine's record-submission API: one POST per record, a JSON
//! body describing the record, a JSON body back describing the outcome.
//! Transport failures are retried a bounded number of times; engine
//! rejections are not, since resubmitting the same record buys nothing.

use serde::Deserialize;
use std::env;

use crate::error::{EngineError, EngineResult};
use crate::models::EntityId;

use super::{EngineRecord, IngestOutcome, ResolutionEngine};

/// Default number of attempts per submission.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between attempts in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Resolution engine reached over HTTP.
#[derive(Clone)]
pub struct HttpEngineClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

/// Engine response for one submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    status: String,
    #[serde(default)]
    affected_entities: Vec<i64>,
    #[serde(default)]
    flagged_entities: Vec<i64>,
}

/// Engine error response.
#[derive(Debug, Deserialize)]
struct EngineErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl HttpEngineClient {
    /// Create a client against an explicit engine base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Create a client from environment variables.
    ///
    /// Reads `ENGINE_URL` (required) and `ENGINE_API_KEY` (optional).
    pub fn from_env() -> EngineResult<Self> {
        // Try loading .env file
        let _ = dotenvy::dotenv();

        let base_url = env::var("ENGINE_URL")
            .map_err(|_| EngineError::new("E_CONFIG", "ENGINE_URL not set"))?;

        let mut client = Self::new(base_url);
        if let Ok(key) = env::var("ENGINE_API_KEY") {
            client.api_key = Some(key);
        }
        Ok(client)
    }

    /// Set the API key sent with each submission.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Submit with bounded retries for transport failures.
    async fn submit_with_retries(&self, record: &EngineRecord) -> EngineResult<IngestOutcome> {
        let mut last_error = None;

        for attempt in 1..=DEFAULT_MAX_RETRIES {
            match self.submit_once(record).await {
                Ok(outcome) => return Ok(outcome),
                // Only transport errors are worth retrying
                Err(e) if e.code == "E_TRANSPORT" => {
                    last_error = Some(e);
                    if attempt < DEFAULT_MAX_RETRIES {
                        tokio::time::sleep(tokio::time::Duration::from_millis(RETRY_DELAY_MS))
                            .await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::transport("Unknown transport error")))
    }

    /// Single submission attempt.
    async fn submit_once(&self, record: &EngineRecord) -> EngineResult<IngestOutcome> {
        let url = format!("{}/records", self.base_url);

        let mut request = self.client.post(&url).json(record);
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::transport(e.to_string()))?;

        parse_ingest_response(status.as_u16(), &body)
    }
}

impl ResolutionEngine for HttpEngineClient {
    async fn ingest_record(&self, record: &EngineRecord) -> EngineResult<IngestOutcome> {
        self.submit_with_retries(record).await
    }
}

/// Map an HTTP status + body to the engine outcome.
fn parse_ingest_response(status: u16, body: &str) -> EngineResult<IngestOutcome> {
    if !(200..300).contains(&status) {
        // Prefer the engine's structured error when the body carries one
        if let Ok(parsed) = serde_json::from_str::<EngineErrorBody>(body) {
            return Err(EngineError::new(
                parsed
                    .error
                    .code
                    .unwrap_or_else(|| format!("E_HTTP_{}", status)),
                parsed.error.message,
            ));
        }
        return Err(EngineError::new(
            format!("E_HTTP_{}", status),
            truncate(body, 200),
        ));
    }

    let parsed: IngestResponse = serde_json::from_str(body)
        .map_err(|e| EngineError::transport(format!("Invalid engine response: {}", e)))?;

    match parsed.status.as_str() {
        "loaded" => Ok(IngestOutcome::Loaded {
            affected: parsed.affected_entities.into_iter().map(EntityId).collect(),
            flagged: parsed.flagged_entities.into_iter().map(EntityId).collect(),
        }),
        "duplicate" => Ok(IngestOutcome::Duplicate),
        other => Err(EngineError::transport(format!(
            "Unknown engine status '{}'",
            other
        ))),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loaded_response() {
        let body = r#"{"status":"loaded","affectedEntities":[10,11],"flaggedEntities":[7]}"#;
        let outcome = parse_ingest_response(200, body).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Loaded {
                affected: vec![EntityId(10), EntityId(11)],
                flagged: vec![EntityId(7)],
            }
        );
    }

    #[test]
    fn test_parse_loaded_without_entities() {
        let body = r#"{"status":"loaded"}"#;
        let outcome = parse_ingest_response(200, body).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Loaded {
                affected: vec![],
                flagged: vec![],
            }
        );
    }

    #[test]
    fn test_parse_duplicate_response() {
        let body = r#"{"status":"duplicate"}"#;
        assert_eq!(
            parse_ingest_response(200, body).unwrap(),
            IngestOutcome::Duplicate
        );
    }

    #[test]
    fn test_parse_structured_error() {
        let body = r#"{"error":{"code":"E0023","message":"unknown data source"}}"#;
        let err = parse_ingest_response(422, body).unwrap_err();
        assert_eq!(err.code, "E0023");
        assert_eq!(err.message, "unknown data source");
    }

    #[test]
    fn test_parse_unstructured_error_keeps_status() {
        let err = parse_ingest_response(503, "gateway unhappy").unwrap_err();
        assert_eq!(err.code, "E_HTTP_503");
        assert!(err.message.contains("gateway unhappy"));
    }

    #[test]
    fn test_parse_garbage_success_body() {
        let err = parse_ingest_response(200, "not json").unwrap_err();
        assert_eq!(err.code, "E_TRANSPORT");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpEngineClient::new("http://engine.local/");
        assert_eq!(client.base_url, "http://engine.local");
    }
}
