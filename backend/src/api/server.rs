//! HTTP Server for the entityload API.
//!
//! Provides REST endpoints for bulk analysis and bulk load. The resolution
//! engine is reached through the HTTP client configured from the
//! environment; authentication in front of this API is someone else's job.
//!
//! # API Endpoints
//!
//! | Method | Path                    | Description                           |
//! |--------|-------------------------|---------------------------------------|
//! | GET    | `/health`               | Health check                          |
//! | POST   | `/api/analyze`          | Upload a batch, analyze without load  |
//! | POST   | `/api/load`             | Upload a batch and load it            |
//! | GET    | `/api/loads/{id}`       | Poll progress / final result of a run |
//! | POST   | `/api/loads/{id}/abort` | Request cancellation of a run         |
//! | GET    | `/api/logs`             | SSE stream for real-time logs         |
//! | GET    | `/api/logs/recent`      | Replayable tail of recent log entries |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::LOG_BROADCASTER;
use super::types::{error_response, AnalysisResponse, LoadResponse, ProgressResponse};
use crate::analyze::analyze;
use crate::classify::DEFAULT_DATA_SOURCE;
use crate::engine::HttpEngineClient;
use crate::load::{load, LoadOptions};
use crate::parser::parse_bytes_auto;
use crate::runs::LOAD_REGISTRY;

type ApiError = (StatusCode, Json<Value>);

/// Start the HTTP server
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let engine = HttpEngineClient::from_env()?;

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/analyze", post(analyze_upload))
        .route("/api/load", post(load_upload))
        .route("/api/loads/{id}", get(load_status))
        .route("/api/loads/{id}/abort", post(load_abort))
        .route("/api/logs", get(sse_logs))
        .route("/api/logs/recent", get(recent_logs))
        .layer(cors)
        .with_state(engine);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Entityload server running on http://localhost:{}", port);
    println!("   POST /api/analyze        - Analyze a bulk file");
    println!("   POST /api/load           - Load a bulk file");
    println!("   GET  /api/loads/{{id}}     - Poll a load run");
    println!("   POST /api/loads/{{id}}/abort - Cancel a load run");
    println!("   GET  /api/logs           - SSE log stream");
    println!("   GET  /health             - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "entityload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "analyze": "POST /api/analyze",
            "load": "POST /api/load",
            "loads": "GET /api/loads/{id}",
            "abort": "POST /api/loads/{id}/abort",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Replayable tail of recent log entries, for late-joining clients
async fn recent_logs() -> Json<Value> {
    Json(json!({ "entries": LOG_BROADCASTER.recent() }))
}

/// One decoded multipart upload.
struct BulkUpload {
    bytes: Vec<u8>,
    file_name: Option<String>,
    data_source: String,
}

/// Pull the file and the optional default data source out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<BulkUpload, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut data_source = DEFAULT_DATA_SOURCE.to_string();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response(&format!("Multipart error: {}", e))),
        )
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            (
                                StatusCode::BAD_REQUEST,
                                Json(error_response(&format!("Read error: {}", e))),
                            )
                        })?
                        .to_vec(),
                );
            }
            "dataSource" => {
                let value = field.text().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(error_response(&format!("Read error: {}", e))),
                    )
                })?;
                if !value.trim().is_empty() {
                    data_source = value.trim().to_uppercase();
                }
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response("No file provided")),
        )
    })?;

    Ok(BulkUpload {
        bytes,
        file_name,
        data_source,
    })
}

/// Analyze endpoint: classify and count, never touch the engine
async fn analyze_upload(multipart: Multipart) -> Result<Json<AnalysisResponse>, ApiError> {
    let upload = read_upload(multipart).await?;

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 ANALYZE: {} ({} bytes)",
        upload.file_name.as_deref().unwrap_or("unknown"),
        upload.bytes.len()
    );
    println!("{}\n", "=".repeat(70));

    let batch = parse_bytes_auto(&upload.bytes).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response(&e.to_string())),
        )
    })?;

    let analysis = analyze(batch.records(), &upload.data_source);

    println!("   Total records:  {}", analysis.total_records);
    println!("   Malformed:      {}", analysis.malformed_records);
    println!("   Data sources:   {}", analysis.data_sources.len());

    Ok(Json(AnalysisResponse::new(analysis, &batch)))
}

/// Load endpoint: run the batch into the engine
async fn load_upload(
    State(engine): State<HttpEngineClient>,
    multipart: Multipart,
) -> Result<Json<LoadResponse>, ApiError> {
    let upload = read_upload(multipart).await?;

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 LOAD: {} ({} bytes)",
        upload.file_name.as_deref().unwrap_or("unknown"),
        upload.bytes.len()
    );
    println!("{}\n", "=".repeat(70));

    let batch = parse_bytes_auto(&upload.bytes).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response(&e.to_string())),
        )
    })?;

    let options = LoadOptions {
        default_data_source: upload.data_source,
        ..LoadOptions::default()
    };

    let (job_id, tracker) = LOAD_REGISTRY.register();

    let result = load(batch.records(), &engine, &tracker, &options)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(error_response(&e.to_string())),
            )
        })?;

    LOAD_REGISTRY.finish(&job_id, result.clone());

    println!("\n{}", "=".repeat(70));
    println!("📊 SUMMARY [{}]", job_id);
    println!("{}", "=".repeat(70));
    println!("   Status:     {}", result.status);
    println!("   Submitted:  {}", result.submitted);
    println!("   Loaded:     {}", result.loaded);
    println!("   Skipped:    {}", result.skipped);
    println!("   Failed:     {}", result.failed);
    println!("{}\n", "=".repeat(70));

    Ok(Json(LoadResponse::new(job_id, result)))
}

/// Poll the progress (or final result) of one load run
async fn load_status(Path(id): Path<String>) -> Result<Json<ProgressResponse>, ApiError> {
    match LOAD_REGISTRY.snapshot(&id) {
        Some(snapshot) => Ok(Json(ProgressResponse::from(snapshot))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(error_response(&format!("Unknown load run: {}", id))),
        )),
    }
}

/// Request cancellation of one load run
async fn load_abort(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    match LOAD_REGISTRY.abort(&id, "Cancelled by client request") {
        Some(aborted) => Ok(Json(json!({ "jobId": id, "aborted": aborted }))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(error_response(&format!("Unknown load run: {}", id))),
        )),
    }
}
