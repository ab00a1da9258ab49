//! REST surface (C9, spec §6).
//!
//! Shaped like the teacher's `api.rs` router (one handler per route, a
//! shared `Arc<AppState>`), with the error-response pattern generalized from
//! `VPRamon-TSI/backend/src/http/error.rs`'s `ApiError`/`AppError` split.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::CatalogRepository;
use crate::error::CoreError;
use crate::orchestrator::{Orchestrator, RunView};
use crate::registry::RunSummary;
use crate::request::ScheduleRequest;

pub struct AppState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Request-handling failures the public API surfaces synchronously (spec
/// §4.1, §6). Run-outcome failures never reach here; they live in the run
/// record as a terminal status (spec §7).
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Saturated(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::Saturated(msg) => (StatusCode::SERVICE_UNAVAILABLE, ApiError::new("SATURATED", msg)),
        };
        (status, Json(error)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidRequest { .. } => AppError::BadRequest(err.to_string()),
            CoreError::NotFound(id) => AppError::NotFound(format!("run {id} not found")),
            CoreError::Saturated => AppError::Saturated(err.to_string()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/runs", post(submit_run))
        .route("/runs", get(list_runs))
        .route("/runs/{id}", get(get_run))
        .route("/catalog/seed", post(seed_catalog))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    run_id: Uuid,
}

/// POST /runs - validate and enqueue a scheduling run (spec §6).
async fn submit_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let run_id = state.orchestrator.submit(request).await?;
    Ok(Json(SubmitResponse { run_id }))
}

/// GET /runs/{id} - current run state, enriched when successful (spec §6).
async fn get_run(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<RunView>, AppError> {
    let view = state.orchestrator.status(id).await?;
    Ok(Json(view))
}

/// GET /runs - summaries of every known run (spec §6).
async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<RunSummary>> {
    Json(state.orchestrator.list().await)
}

/// POST /catalog/seed - idempotent "load demo catalog" (spec §6). Has no
/// effect on in-flight or past runs.
async fn seed_catalog(State(state): State<Arc<AppState>>) -> StatusCode {
    state.catalog.seed().await;
    StatusCode::NO_CONTENT
}
