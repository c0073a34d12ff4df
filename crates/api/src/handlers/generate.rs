//! Handlers for run control.
//!
//! Every advance and regenerate call only admits a stage worker and returns
//! `202 Accepted`; the outcome arrives on the run's progress stream.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use reel_core::types::RunId;
use reel_pipeline::{
    Ack, ContinueRequest, FinalizeRequest, RegenerateRequest, RegenerateVoicesRequest,
    StartRequest, VideosRequest, VoicesRequest,
};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/generate
///
/// Create a run and generate its script synchronously.
pub async fn start(
    State(state): State<AppState>,
    Json(input): Json<StartRequest>,
) -> AppResult<impl IntoResponse> {
    let created = state.orchestrator.start(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// GET /api/generate/{run_id}
///
/// The authoritative state of a run.
pub async fn snapshot(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.orchestrator.snapshot(&run_id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// POST /api/generate/{run_id}/continue
///
/// Advance to images. The body may carry an edited script and the scenes
/// that changed; it may also be omitted.
pub async fn advance_images(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    input: Option<Json<ContinueRequest>>,
) -> AppResult<impl IntoResponse> {
    let ack = state
        .orchestrator
        .advance_images(&run_id, body_or_default(input))
        .await?;
    Ok(accepted(ack))
}

/// POST /api/generate/{run_id}/regenerate-images
pub async fn regenerate_images(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Json(input): Json<RegenerateRequest>,
) -> AppResult<impl IntoResponse> {
    let ack = state.orchestrator.regenerate_images(&run_id, input).await?;
    Ok(accepted(ack))
}

/// POST /api/generate/{run_id}/compose
///
/// Advance to videos, optionally reordering scenes first.
pub async fn advance_videos(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    input: Option<Json<VideosRequest>>,
) -> AppResult<impl IntoResponse> {
    let ack = state
        .orchestrator
        .advance_videos(&run_id, body_or_default(input))
        .await?;
    Ok(accepted(ack))
}

/// POST /api/generate/{run_id}/regenerate-videos
pub async fn regenerate_videos(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Json(input): Json<RegenerateRequest>,
) -> AppResult<impl IntoResponse> {
    let ack = state.orchestrator.regenerate_videos(&run_id, input).await?;
    Ok(accepted(ack))
}

/// POST /api/generate/{run_id}/generate-voices
pub async fn advance_voices(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    input: Option<Json<VoicesRequest>>,
) -> AppResult<impl IntoResponse> {
    let ack = state
        .orchestrator
        .advance_voices(&run_id, body_or_default(input))
        .await?;
    Ok(accepted(ack))
}

/// POST /api/generate/{run_id}/regenerate-voices
///
/// Re-record every narration with text, emotion or prosody overrides.
pub async fn regenerate_voices(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Json(input): Json<RegenerateVoicesRequest>,
) -> AppResult<impl IntoResponse> {
    let ack = state.orchestrator.regenerate_voices(&run_id, input).await?;
    Ok(accepted(ack))
}

/// POST /api/generate/{run_id}/finalize
///
/// Compose the final video with optional transitions and captions.
pub async fn finalize(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    input: Option<Json<FinalizeRequest>>,
) -> AppResult<impl IntoResponse> {
    let ack = state
        .orchestrator
        .finalize(&run_id, body_or_default(input))
        .await?;
    Ok(accepted(ack))
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn accepted(ack: Ack) -> (StatusCode, Json<DataResponse<Ack>>) {
    (StatusCode::ACCEPTED, Json(DataResponse { data: ack }))
}

fn body_or_default<T: Default>(input: Option<Json<T>>) -> T {
    input.map(|Json(body)| body).unwrap_or_default()
}
