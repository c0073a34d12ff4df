//! Handlers for the finalized-run history.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use reel_core::types::RunId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/history
///
/// Summaries of every finalized run, newest first.
pub async fn list(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let entries = state.orchestrator.history().list().await?;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /api/history/{run_id}
pub async fn get(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<impl IntoResponse> {
    let entry = state.orchestrator.history().get(&run_id).await?;
    Ok(Json(DataResponse { data: entry }))
}

/// DELETE /api/history/{run_id}
///
/// Remove the entry. Files on disk and any live run are left alone.
pub async fn delete(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<impl IntoResponse> {
    let removed = state.orchestrator.history().delete(&run_id).await?;
    tracing::info!(run_id = %run_id, "History entry deleted");
    Ok(Json(DataResponse { data: removed }))
}

/// POST /api/history/{run_id}/restore
///
/// Rebuild the run in the registry from its entry and the files on disk.
pub async fn restore(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.restore(&run_id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}
