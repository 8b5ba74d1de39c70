//! HTTP routes over the question-answering engine.
//!
//! Successful responses carry `"success": true` beside the payload. Engine
//! errors map to 404 (`NotFound`), 400 (`InvalidConfiguration`) or 500.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use docqa_rag::{
    AnswerRequest, AnswerResult, DeletionReport, Dialogue, DocumentSummary, IngestReport,
    QaEngine, RagError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::config::{BackendConfig, ServerConfig};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QaEngine>,
}

impl AppState {
    pub fn new(engine: QaEngine) -> Self {
        Self { engine: Arc::new(engine) }
    }
}

/// Build the HTTP router over an engine.
pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/documents", post(ingest_document).get(list_documents))
        .route("/documents/{document_id}", delete(delete_document))
        .route("/chat/query", post(chat_query))
        .route("/dialogues", get(list_dialogues))
        .route("/dialogues/{dialogue_id}", delete(delete_dialogue))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build the engine from the environment and serve until shutdown.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let backend = BackendConfig::from_env()?;
    let engine = backend.build_engine().await.context("failed to build engine")?;
    let app = app_router(AppState::new(engine));
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for docqa-server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("docqa-server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// A successful response: `"success": true` next to the payload's fields.
#[derive(Serialize)]
struct Success<T> {
    success: bool,
    #[serde(flatten)]
    payload: T,
}

fn success<T: Serialize>(payload: T) -> Json<Success<T>> {
    Json(Success { success: true, payload })
}

/// An engine error rendered as `{"success": false, "error": ...}`.
pub struct ApiError(RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(json!({"success": false, "error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct DialoguesQuery {
    user_id: String,
    #[serde(default = "default_dialogue_limit")]
    limit: usize,
}

fn default_dialogue_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    user_id: String,
    filename: String,
    pages: Vec<String>,
}

#[derive(Serialize)]
struct Files {
    files: Vec<DocumentSummary>,
}

#[derive(Serialize)]
struct Dialogues {
    dialogues: Vec<Dialogue>,
}

#[derive(Serialize)]
struct Deleted<T> {
    message: String,
    #[serde(flatten)]
    report: T,
}

async fn health() -> impl IntoResponse {
    Json(json!({"status":"ok","service":"docqa-server"}))
}

async fn ingest_document(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<IngestReport> {
    let report = state
        .engine
        .ingest_document(&request.user_id, &request.filename, &request.pages)
        .await?;
    Ok(success(report))
}

async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Files> {
    let files = state.engine.list_documents(&query.user_id).await?;
    Ok(success(Files { files }))
}

async fn delete_document(
    Path(document_id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Deleted<DeletionReport>> {
    let report = state.engine.delete_document(&document_id, &query.user_id).await?;
    Ok(success(Deleted {
        message: format!("File '{}' deleted successfully", report.filename),
        report,
    }))
}

async fn chat_query(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<AnswerResult> {
    let answer = state.engine.answer_query(request).await?;
    Ok(success(answer))
}

async fn list_dialogues(
    State(state): State<AppState>,
    Query(query): Query<DialoguesQuery>,
) -> ApiResult<Dialogues> {
    let dialogues = state.engine.list_dialogues(&query.user_id, query.limit).await?;
    Ok(success(Dialogues { dialogues }))
}

async fn delete_dialogue(
    Path(dialogue_id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<serde_json::Value> {
    state.engine.delete_dialogue(&dialogue_id, &query.user_id).await?;
    Ok(success(json!({
        "message": "Dialogue deleted successfully",
        "dialogue_id": dialogue_id,
    })))
}
