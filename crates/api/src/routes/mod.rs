pub mod generate;
pub mod health;
pub mod history;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /voices                                      voice catalogue
///
/// /generate                                    start (POST)
/// /generate/{run_id}                           snapshot
/// /generate/{run_id}/continue                  advance to images (POST)
/// /generate/{run_id}/regenerate-images         partial images (POST)
/// /generate/{run_id}/compose                   advance to videos (POST)
/// /generate/{run_id}/regenerate-videos         partial videos (POST)
/// /generate/{run_id}/generate-voices           advance to voices (POST)
/// /generate/{run_id}/regenerate-voices         re-record narration (POST)
/// /generate/{run_id}/finalize                  compose final video (POST)
/// /generate/{run_id}/progress                  SSE (mounted by the router, no timeout)
///
/// /history                                     list
/// /history/{run_id}                            get, delete
/// /history/{run_id}/restore                    rebuild the run (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/voices", get(handlers::voices::list_voices))
        .nest("/generate", generate::router())
        .nest("/history", history::router())
}
