//! Route definitions for the finalized-run history.
//!
//! ```text
//! GET    /                        list
//! GET    /{run_id}                get
//! DELETE /{run_id}                delete
//! POST   /{run_id}/restore        restore
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::history;
use crate::state::AppState;

/// Routes nested under `/api/history`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(history::list))
        .route("/{run_id}", get(history::get).delete(history::delete))
        .route("/{run_id}/restore", post(history::restore))
}
