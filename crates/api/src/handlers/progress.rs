//! Server-sent progress stream.
//!
//! Each [`ProgressEvent`](reel_events::ProgressEvent) becomes one SSE frame
//! named after its status, with the camelCase wire payload as data. Idle
//! windows produce a `: keepalive` comment. The stream ends after the
//! stage's terminal event.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use futures::stream::{self, Stream};
use reel_core::types::RunId;
use reel_events::{ProgressStream, StreamItem};

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/generate/{run_id}/progress
///
/// 404 when the run has no open progress channel, 409 when another client
/// is already attached.
pub async fn stream_progress(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<impl IntoResponse> {
    let progress = state.orchestrator.subscribe(&run_id).await?;
    tracing::debug!(run_id = %run_id, "Progress stream attached");
    Ok(Sse::new(sse_events(progress)))
}

fn sse_events(progress: ProgressStream) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(progress, |mut progress| async move {
        let frame = match progress.next().await? {
            StreamItem::Event(event) => {
                let data = serde_json::to_string(&event.to_wire()).unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Failed to encode progress event");
                    "{}".to_string()
                });
                Event::default().event(event.status()).data(data)
            }
            StreamItem::KeepAlive => Event::default().comment("keepalive"),
        };
        Some((Ok(frame), progress))
    })
}
