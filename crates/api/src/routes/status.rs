//! Worker status endpoint for operational dashboards.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use courier_common::error::AppError;
use courier_common::types::WorkerStatus;
use courier_worker::scheduler::WorkerStatusService;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/workers/status", get(worker_status))
}

/// GET /api/workers/status — per-worker schedule, heartbeat, and quiet-hours
/// state.
async fn worker_status(State(state): State<AppState>) -> Result<Json<Vec<WorkerStatus>>, AppError> {
    let statuses = WorkerStatusService::get_status(&state.pool, &state.config).await?;
    Ok(Json(statuses))
}
