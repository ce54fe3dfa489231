// Consignado Report Mapper - Web Server
// REST API over the batch processor: upload partner-bank datasets, poll job
// status, download the consolidated result.

use axum::{
    extract::{Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use consignado_mapper::{
    BatchProcessor, JobStore, MappingIndex, ProcessingJob, ReportSummary, UploadedFile,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    index: Arc<MappingIndex>,
    jobs: JobStore,
    output_dir: PathBuf,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

#[derive(Serialize)]
struct ProcessResponse {
    job_id: String,
    total_records: usize,
    bank_summaries: Vec<ReportSummary>,
    download_url: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/process - Upload one or more bank datasets and run the batch
async fn process_datasets(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut files = Vec::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let filename = field
                    .file_name()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "upload.csv".to_string());
                match field.bytes().await {
                    Ok(bytes) => files.push(UploadedFile {
                        filename,
                        bytes: bytes.to_vec(),
                    }),
                    Err(e) => {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(ApiResponse::err(format!("failed to read upload: {e}"))),
                        )
                            .into_response()
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::err(format!("malformed multipart body: {e}"))),
                )
                    .into_response()
            }
        }
    }

    if files.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("no dataset files were uploaded")),
        )
            .into_response();
    }

    let job = state.jobs.create();
    let job_id = job.id.clone();
    info!("Job {} accepted with {} file(s)", job_id, files.len());

    // The batch runs synchronously to completion; keep it off the async
    // worker threads.
    let run_state = state.clone();
    let run_job_id = job_id.clone();
    let result = tokio::task::spawn_blocking(move || {
        let processor = BatchProcessor::new(run_state.index.clone());
        processor.process_files(&run_state.jobs, &run_job_id, files, &run_state.output_dir)
    })
    .await;

    match result {
        Ok(Ok(outcome)) => (
            StatusCode::OK,
            Json(ApiResponse::ok(ProcessResponse {
                job_id: outcome.job_id.clone(),
                total_records: outcome.total_records,
                bank_summaries: outcome.summaries,
                download_url: format!("/api/result/{}", outcome.job_id),
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            error!("Job {} failed: {e:#}", job_id);
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::err(format!("{e:#}"))),
            )
                .into_response()
        }
        Err(e) => {
            error!("Job {} panicked: {e}", job_id);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err("internal processing error")),
            )
                .into_response()
        }
    }
}

/// GET /api/status/:job_id - ProcessingJob snapshot
async fn job_status(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<String>,
) -> impl IntoResponse {
    match state.jobs.get(&job_id) {
        Some(job) => (StatusCode::OK, Json(ApiResponse::<ProcessingJob>::ok(job))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err("job not found")),
        )
            .into_response(),
    }
}

/// GET /api/result/:job_id - Download the consolidated result CSV
async fn job_result(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<String>,
) -> impl IntoResponse {
    let Some(job) = state.jobs.get(&job_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err("job not found")),
        )
            .into_response();
    };

    let Some(result_file) = job.result_file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("processing has not completed")),
        )
            .into_response();
    };

    match tokio::fs::read(&result_file).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!(
                        "attachment; filename=\"{}\"",
                        result_file
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "resultado.csv".to_string())
                    ),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!("Result file missing for job {}: {e}", job_id);
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::err("result file not found")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: mapper-server <reference.csv> [output_dir]");
        std::process::exit(2);
    }

    println!("🌐 Consignado Report Mapper - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let reference_path = PathBuf::from(&args[1]);
    let index = match MappingIndex::load(&reference_path) {
        Ok(index) => index,
        Err(e) => {
            eprintln!("❌ Failed to load reference table: {e}");
            eprintln!("   The server cannot start without a mapping index.");
            std::process::exit(1);
        }
    };
    println!("✓ Reference index loaded: {} entries", index.len());

    let output_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);

    let state = AppState {
        index: Arc::new(index),
        jobs: JobStore::new(),
        output_dir,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/process", post(process_datasets))
        .route("/status/:job_id", get(job_status))
        .route("/result/:job_id", get(job_result))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   Upload: POST http://localhost:3000/api/process");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
