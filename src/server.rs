//! HTTP server exposing an editor session

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::history::HistorySnapshot;
use crate::session::{SessionError, SessionView, SharedSession, TurnOutcome};
use crate::tasks::{presets, TaskPreset};
use crate::types::{CandidateMutation, ModelTier, PipelineStage, RequestKind};

#[derive(Debug, Deserialize)]
pub struct TurnRequestHttp {
    pub input: String,
    pub kind: RequestKind,
    #[serde(default)]
    pub highlighted: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevertRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    pub tier: ModelTier,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub stage: PipelineStage,
    pub label: &'static str,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, details: Option<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            details,
        }),
    )
}

impl From<SessionError> for (StatusCode, Json<ErrorResponse>) {
    fn from(e: SessionError) -> Self {
        let status = match &e {
            SessionError::Busy | SessionError::NoPendingCandidates => StatusCode::CONFLICT,
            SessionError::CandidateOutOfRange { .. } | SessionError::History(_) => StatusCode::BAD_REQUEST,
            SessionError::UnknownTask(_) => StatusCode::NOT_FOUND,
        };
        warn!("Request rejected ({}): {}", status, e);
        api_error(status, "Request rejected", Some(e.to_string()))
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "docforge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn state_handler(State(session): State<SharedSession>) -> Json<SessionView> {
    Json(session.view().await)
}

async fn stage_handler(State(session): State<SharedSession>) -> Json<StageResponse> {
    let stage = session.stage();
    Json(StageResponse {
        stage,
        label: stage.label(),
    })
}

async fn turn_handler(
    State(session): State<SharedSession>,
    Json(req): Json<TurnRequestHttp>,
) -> Result<Json<TurnOutcome>, ApiError> {
    info!("Received {:?} turn: input='{}'", req.kind, req.input);

    if req.input.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Input must not be empty", None));
    }

    let outcome = session
        .submit(req.kind, req.input, req.highlighted, None)
        .await?;

    if let TurnOutcome::Failed { ref reason } = outcome {
        error!("Turn failed: {}", reason);
    }
    Ok(Json(outcome))
}

async fn accept_handler(
    State(session): State<SharedSession>,
    Path(index): Path<usize>,
) -> Result<Json<CandidateMutation>, ApiError> {
    Ok(Json(session.accept(index).await?))
}

async fn dismiss_handler(State(session): State<SharedSession>) -> Result<StatusCode, ApiError> {
    session.dismiss().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revert_handler(
    State(session): State<SharedSession>,
    Json(req): Json<RevertRequest>,
) -> Result<Json<SessionView>, ApiError> {
    session.revert_to(req.index).await?;
    Ok(Json(session.view().await))
}

async fn reset_handler(State(session): State<SharedSession>) -> Result<Json<SessionView>, ApiError> {
    session.reset().await?;
    Ok(Json(session.view().await))
}

async fn document_handler(
    State(session): State<SharedSession>,
    Json(req): Json<DocumentRequest>,
) -> Result<Json<SessionView>, ApiError> {
    session.set_document(req.html).await?;
    Ok(Json(session.view().await))
}

async fn model_handler(
    State(session): State<SharedSession>,
    Json(req): Json<ModelRequest>,
) -> Json<SessionView> {
    session.set_model_tier(req.tier).await;
    Json(session.view().await)
}

async fn tasks_handler() -> Json<&'static [TaskPreset]> {
    Json(presets())
}

async fn load_task_handler(
    State(session): State<SharedSession>,
    Path(key): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    session.load_task(&key).await?;
    Ok(Json(session.view().await))
}

async fn export_handler(State(session): State<SharedSession>) -> Json<HistorySnapshot> {
    Json(session.export().await)
}

async fn import_handler(
    State(session): State<SharedSession>,
    Json(snapshot): Json<HistorySnapshot>,
) -> Result<Json<SessionView>, ApiError> {
    session.import(snapshot).await?;
    Ok(Json(session.view().await))
}

/// Create and configure the HTTP router
pub fn create_router(session: SharedSession) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/stage", get(stage_handler))
        .route("/turns", post(turn_handler))
        .route("/candidates/:index/accept", post(accept_handler))
        .route("/candidates/dismiss", post(dismiss_handler))
        .route("/history/revert", post(revert_handler))
        .route("/history/reset", post(reset_handler))
        .route("/document", put(document_handler))
        .route("/model", put(model_handler))
        .route("/tasks", get(tasks_handler))
        .route("/tasks/:key/load", post(load_task_handler))
        .route("/session/export", get(export_handler))
        .route("/session/import", post(import_handler))
        .with_state(session)
}

/// Run the HTTP server
pub async fn run_server(session: SharedSession, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting docforge server on {}", addr);

    let app = create_router(session);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
