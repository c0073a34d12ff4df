//! Route definitions for run control.
//!
//! ```text
//! POST   /                                start
//! GET    /{run_id}                        snapshot
//! POST   /{run_id}/continue               advance_images
//! POST   /{run_id}/regenerate-images      regenerate_images
//! POST   /{run_id}/compose                advance_videos
//! POST   /{run_id}/regenerate-videos      regenerate_videos
//! POST   /{run_id}/generate-voices        advance_voices
//! POST   /{run_id}/regenerate-voices      regenerate_voices
//! POST   /{run_id}/finalize               finalize
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{generate, progress};
use crate::state::AppState;

/// Routes nested under `/api/generate`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(generate::start))
        .route("/{run_id}", get(generate::snapshot))
        .route("/{run_id}/continue", post(generate::advance_images))
        .route("/{run_id}/regenerate-images", post(generate::regenerate_images))
        .route("/{run_id}/compose", post(generate::advance_videos))
        .route("/{run_id}/regenerate-videos", post(generate::regenerate_videos))
        .route("/{run_id}/generate-voices", post(generate::advance_voices))
        .route("/{run_id}/regenerate-voices", post(generate::regenerate_voices))
        .route("/{run_id}/finalize", post(generate::finalize))
}

/// The progress stream, with its full path.
///
/// Kept apart from [`router`] so it can be mounted outside the request
/// timeout layer.
pub fn stream_router() -> Router<AppState> {
    Router::new().route(
        "/api/generate/{run_id}/progress",
        get(progress::stream_progress),
    )
}
