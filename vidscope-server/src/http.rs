//! Vidscope HTTP API
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`; the inner functions are
//! callable directly from tests without the axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health      : health check with store status
//! - GET  /version     : server version info
//! - POST /upload      : store a video (multipart `file`)
//! - POST /analyze     : analyze an uploaded file or a `{videoUrl}` reference
//! - GET  /videoDetails: fetch a stored analysis by `videoUrl`
//! - POST /askQuestion : stateless follow-up question
//! - POST /uploadToS3  : copy a blob URL into object storage

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use vidscope_core::config::UrlMode;
use vidscope_core::{
    AnalysisStore, GenerativeBackend, MediaExtractor, ObjectStore, StorageError, VidscopeConfig,
    VidscopeError,
};

use crate::subsystems::{analyze, ask, upload};

/// Extra body allowance for multipart framing on top of the file limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub config: VidscopeConfig,
    pub store: Arc<dyn AnalysisStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub model: Arc<dyn GenerativeBackend>,
    pub extractor: MediaExtractor,
    pub http_client: reqwest::Client,
}

impl HttpState {
    fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.media.work_dir)
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let body_limit = state.config.http.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/upload", post(upload_handler))
        .route("/analyze", post(analyze_handler))
        .route("/videoDetails", get(video_details_handler))
        .route("/askQuestion", post(ask_question_handler))
        .route("/uploadToS3", post(upload_to_storage_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Vidscope HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// A file received through a multipart `file` field.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeUrlRequest {
    pub video_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetailsQuery {
    pub video_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AskQuestionRequest {
    pub context: Option<String>,
    pub video_url: Option<String>,
    pub question: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub blob_url: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

fn error_reply(status: StatusCode, msg: impl Into<String>) -> (StatusCode, serde_json::Value) {
    let body = serde_json::to_value(ErrorResponse::new(msg))
        .unwrap_or_else(|_| serde_json::json!({ "status": "error" }));
    (status, body)
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: queries the store and returns (status_code, json_body).
pub async fn health_inner(store: &dyn AnalysisStore) -> (StatusCode, serde_json::Value) {
    match store.health().await {
        Ok(detail) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": detail,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "vidscope/1",
    })
}

/// Inner upload: validates and stores a video, returns `{ url }`.
pub async fn upload_inner(
    state: &HttpState,
    file: Option<UploadedFile>,
) -> (StatusCode, serde_json::Value) {
    let Some(file) = file else {
        return error_reply(StatusCode::BAD_REQUEST, "No file provided");
    };

    if let Err(rejection) = upload::validate_video(
        &file.content_type,
        file.data.len(),
        state.config.http.max_upload_bytes,
    ) {
        return error_reply(StatusCode::BAD_REQUEST, rejection.to_string());
    }

    match upload::store_video(
        state.objects.as_ref(),
        &file.file_name,
        &file.content_type,
        file.data,
    )
    .await
    {
        Ok(url) => (StatusCode::OK, serde_json::json!({ "url": url })),
        Err(e) => {
            tracing::error!(error = %e, "Error uploading file");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload file")
        }
    }
}

/// Inner analyze for an uploaded file: full extraction pipeline.
pub async fn analyze_file_inner(
    state: &HttpState,
    file: Option<UploadedFile>,
) -> (StatusCode, serde_json::Value) {
    let Some(file) = file else {
        return error_reply(StatusCode::BAD_REQUEST, "No video file provided");
    };

    if let Err(rejection) = upload::validate_video(
        &file.content_type,
        file.data.len(),
        state.config.http.max_upload_bytes,
    ) {
        return error_reply(StatusCode::BAD_REQUEST, rejection.to_string());
    }

    let result = analyze::analyze_uploaded_file(
        state.model.as_ref(),
        state.objects.as_ref(),
        state.store.as_ref(),
        &state.extractor,
        &state.work_dir(),
        &file.file_name,
        &file.content_type,
        file.data,
    )
    .await;

    match result {
        Ok(done) => {
            let mut body = serde_json::json!({
                "analysis": done.record,
                "videoUrl": done.record.video_url,
            });
            if let (Some(url), Some(obj)) = (done.analysis_url, body.as_object_mut()) {
                obj.insert("analysisUrl".to_string(), serde_json::json!(url));
            }
            (StatusCode::OK, body)
        }
        Err(e) => {
            tracing::error!(error = %e, "Error analyzing video");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to analyze video")
        }
    }
}

/// Inner analyze for a `{ videoUrl }` reference.
pub async fn analyze_url_inner(
    state: &HttpState,
    req: AnalyzeUrlRequest,
) -> (StatusCode, serde_json::Value) {
    let Some(video_url) = required(req.video_url) else {
        return error_reply(StatusCode::BAD_REQUEST, "videoUrl is required");
    };

    match state.config.analysis.url_mode {
        UrlMode::Reference => {
            match analyze::analyze_reference(state.model.as_ref(), state.store.as_ref(), &video_url)
                .await
            {
                Ok(done) => (
                    StatusCode::OK,
                    serde_json::json!({
                        "structuredAnalysis": done.parsed.fields,
                        "videoUrl": video_url,
                    }),
                ),
                Err(e) => {
                    tracing::error!(error = %e, video_url = %video_url, "Error analyzing video reference");
                    error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to analyze video")
                }
            }
        }
        UrlMode::Extract => {
            let result = analyze::analyze_stored_video(
                state.model.as_ref(),
                state.objects.as_ref(),
                state.store.as_ref(),
                &state.extractor,
                &state.work_dir(),
                &video_url,
            )
            .await;

            match result {
                Ok(done) => {
                    let mut body = serde_json::json!({
                        "analysis": done.record,
                        "videoUrl": video_url,
                    });
                    if let (Some(url), Some(obj)) = (done.analysis_url, body.as_object_mut()) {
                        obj.insert("analysisUrl".to_string(), serde_json::json!(url));
                    }
                    (StatusCode::OK, body)
                }
                Err(VidscopeError::Storage(StorageError::ForeignUrl(_))) => error_reply(
                    StatusCode::BAD_REQUEST,
                    "videoUrl does not belong to this service's storage",
                ),
                Err(VidscopeError::Storage(StorageError::NotFound(_))) => {
                    error_reply(StatusCode::NOT_FOUND, "Video not found in storage")
                }
                Err(e) => {
                    tracing::error!(error = %e, video_url = %video_url, "Error analyzing stored video");
                    error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to analyze video")
                }
            }
        }
    }
}

/// Inner video details: `{ analysis }` or 404.
pub async fn video_details_inner(
    store: &dyn AnalysisStore,
    query: VideoDetailsQuery,
) -> (StatusCode, serde_json::Value) {
    let Some(video_url) = required(query.video_url) else {
        return error_reply(StatusCode::BAD_REQUEST, "Video URL is required");
    };

    match store.find_by_url(&video_url).await {
        Ok(Some(record)) => (StatusCode::OK, serde_json::json!({ "analysis": record })),
        Ok(None) => error_reply(StatusCode::NOT_FOUND, "Analysis not found"),
        Err(e) => {
            tracing::error!(error = %e, "Error fetching analysis");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch analysis")
        }
    }
}

/// Inner ask: validates before any model call, then answers statelessly.
pub async fn ask_question_inner(
    state: &HttpState,
    req: AskQuestionRequest,
) -> (StatusCode, serde_json::Value) {
    let Some(question) = required(req.question) else {
        return error_reply(StatusCode::BAD_REQUEST, "context and question are required");
    };

    let context = match ask::resolve_context(
        state.store.as_ref(),
        req.context.as_deref(),
        req.video_url.as_deref(),
    )
    .await
    {
        Ok(Some(ctx)) => ctx,
        Ok(None) => {
            return error_reply(StatusCode::BAD_REQUEST, "context and question are required");
        }
        Err(e) => {
            tracing::error!(error = %e, "Error resolving question context");
            return error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process the question");
        }
    };

    match ask::answer_question(state.model.as_ref(), &context, &question).await {
        Ok(answer) => (StatusCode::OK, serde_json::json!({ "answer": answer })),
        Err(e) => {
            tracing::error!(error = %e, "Error answering question");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process the question")
        }
    }
}

/// Inner blob transfer: `{ success, s3Url }`.
pub async fn upload_to_storage_inner(
    state: &HttpState,
    req: TransferRequest,
) -> (StatusCode, serde_json::Value) {
    let (Some(blob_url), Some(file_name)) = (required(req.blob_url), required(req.file_name)) else {
        return error_reply(StatusCode::BAD_REQUEST, "Missing required fields");
    };

    match upload::transfer_blob(
        &state.http_client,
        state.objects.as_ref(),
        &blob_url,
        &file_name,
        req.content_type.as_deref(),
    )
    .await
    {
        Ok(url) => (
            StatusCode::OK,
            serde_json::json!({ "success": true, "s3Url": url }),
        ),
        Err(e) => {
            tracing::error!(error = %e, blob_url = %blob_url, "Storage transfer error");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to transfer file")
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

/// Pull the `file` field out of a multipart body.
pub async fn read_file_field(
    mut multipart: Multipart,
) -> std::result::Result<Option<UploadedFile>, (StatusCode, serde_json::Value)> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => return Err(error_reply(StatusCode::BAD_REQUEST, e.body_text())),
        };

        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("video.mp4").to_string();
        let content_type = field
            .content_type()
            .unwrap_or(mime_fallback(&file_name))
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| error_reply(StatusCode::BAD_REQUEST, e.body_text()))?;

        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            data,
        }));
    }
}

fn mime_fallback(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn upload_handler(
    State(state): State<Arc<HttpState>>,
    multipart: Multipart,
) -> impl IntoResponse {
    let (status, body) = match read_file_field(multipart).await {
        Ok(file) => upload_inner(&state, file).await,
        Err(reply) => reply,
    };
    (status, Json(body))
}

/// Multipart bodies go through file analysis, anything else is read as JSON.
pub async fn analyze_handler(
    State(state): State<Arc<HttpState>>,
    request: Request,
) -> impl IntoResponse {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (status, body) = if is_multipart {
        match Multipart::from_request(request, &state).await {
            Ok(multipart) => match read_file_field(multipart).await {
                Ok(file) => analyze_file_inner(&state, file).await,
                Err(reply) => reply,
            },
            Err(rejection) => error_reply(StatusCode::BAD_REQUEST, rejection.body_text()),
        }
    } else {
        match Json::<AnalyzeUrlRequest>::from_request(request, &state).await {
            Ok(Json(req)) => analyze_url_inner(&state, req).await,
            Err(rejection) => error_reply(StatusCode::BAD_REQUEST, rejection.body_text()),
        }
    };
    (status, Json(body))
}

pub async fn video_details_handler(
    State(state): State<Arc<HttpState>>,
    query: Result<Query<VideoDetailsQuery>, QueryRejection>,
) -> impl IntoResponse {
    let (status, body) = match query {
        Ok(Query(query)) => video_details_inner(state.store.as_ref(), query).await,
        Err(rejection) => error_reply(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    (status, Json(body))
}

/// Body rejections (wrong content type, malformed or mistyped JSON) become
/// the standard 400 error body.
pub async fn ask_question_handler(
    State(state): State<Arc<HttpState>>,
    req: Result<Json<AskQuestionRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match req {
        Ok(Json(req)) => ask_question_inner(&state, req).await,
        Err(rejection) => error_reply(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    (status, Json(body))
}

pub async fn upload_to_storage_handler(
    State(state): State<Arc<HttpState>>,
    req: Result<Json<TransferRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match req {
        Ok(Json(req)) => upload_to_storage_inner(&state, req).await,
        Err(rejection) => error_reply(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    (status, Json(body))
}

// ============================================================================
// Unit Tests: pure helpers and inner functions over in-memory stores
// ============================================================================
