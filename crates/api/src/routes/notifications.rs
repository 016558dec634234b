//! Notification inspection and the manual retry trigger.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Notification, RetrySchedule};
use courier_worker::manual::ManualRetryService;
use courier_worker::store::{NotificationStore, RetryStore};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/{id}", get(get_notification))
        .route("/api/notifications/{id}/retries", get(list_retries))
        .route("/api/notifications/{id}/retry", post(trigger_retry))
}

/// GET /api/notifications/:id — Inspect a single notification.
async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = NotificationStore::get(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;
    Ok(Json(notification))
}

/// GET /api/notifications/:id/retries — Retry history, newest attempt first.
async fn list_retries(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RetrySchedule>>, AppError> {
    let rows = RetryStore::list_for_notification(&state.pool, id).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
struct TriggerRetryParams {
    reason: Option<String>,
}

/// POST /api/notifications/:id/retry — Schedule an immediate manual retry.
async fn trigger_retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(params): Json<TriggerRetryParams>,
) -> Result<Json<RetrySchedule>, AppError> {
    let reason = params
        .reason
        .unwrap_or_else(|| "manual retry requested".to_string());
    let row = ManualRetryService::trigger(
        &state.pool,
        id,
        &reason,
        state.config.max_retries as i32,
    )
    .await?;
    Ok(Json(row))
}
