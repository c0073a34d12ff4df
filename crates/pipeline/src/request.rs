//! Inputs and outputs of the control operations.

use std::collections::BTreeMap;

use reel_core::caption::CaptionSettings;
use reel_core::composition::Transition;
use reel_core::script::{Script, ScriptRequest};
use reel_core::stage::Stage;
use reel_core::types::{RunId, SceneId, Timestamp};
use reel_core::voice::VoiceSettings;
use reel_events::ArtifactRef;
use serde::{Deserialize, Serialize};

use crate::registry::StageOutcome;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    #[serde(flatten)]
    pub script: ScriptRequest,
    /// Bypass every provider with placeholders.
    #[serde(default)]
    pub mock: bool,
}

impl StartRequest {
    pub fn new(theme: impl Into<String>) -> Self {
        Self {
            script: ScriptRequest::new(theme),
            mock: false,
        }
    }

    pub fn mock(mut self) -> Self {
        self.mock = true;
        self
    }
}

/// Advance to images, optionally with an edited script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContinueRequest {
    #[serde(default)]
    pub script: Option<Script>,
    #[serde(default)]
    pub changed_scene_ids: Option<Vec<SceneId>>,
}

/// Regenerate selected scenes with free-text instructions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub scene_instructions: BTreeMap<SceneId, String>,
}

/// Advance to videos.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideosRequest {
    /// Final scene order, as a permutation of the script's scene ids.
    #[serde(default)]
    pub scene_order: Option<Vec<SceneId>>,
    #[serde(default)]
    pub changed_scene_ids: Option<Vec<SceneId>>,
}

/// Advance to voices.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoicesRequest {
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub changed_scene_ids: Option<Vec<SceneId>>,
}

/// Re-record every narration after editing texts or emotions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegenerateVoicesRequest {
    #[serde(default)]
    pub texts: BTreeMap<SceneId, String>,
    #[serde(default)]
    pub emotions: BTreeMap<SceneId, String>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default, alias = "telop")]
    pub caption: Option<CaptionSettings>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub run_id: RunId,
    pub script: Script,
}

/// Returned when a stage worker has been admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub run_id: RunId,
    pub stage: Stage,
}

/// Authoritative view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub created_at: Timestamp,
    pub theme: String,
    pub mock: bool,
    pub voice_id: String,
    pub voice_settings: VoiceSettings,
    pub script: Script,
    pub images: Option<Vec<ArtifactRef>>,
    pub videos: Option<Vec<ArtifactRef>>,
    pub voices: Option<Vec<ArtifactRef>>,
    pub video_url: Option<String>,
    pub active_stage: Option<Stage>,
    pub last_outcome: Option<StageOutcome>,
}
