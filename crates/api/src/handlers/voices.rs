use axum::Json;
use reel_core::voice::{VoiceOption, VOICES};

use crate::response::DataResponse;

/// GET /api/voices
///
/// The narration voices a run may select. The first entry is the default.
pub async fn list_voices() -> Json<DataResponse<&'static [VoiceOption]>> {
    Json(DataResponse { data: VOICES })
}
