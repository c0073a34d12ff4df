//! Progress events emitted by stage workers.

use reel_core::stage::{Stage, TOTAL_STAGES};
use reel_core::types::SceneId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payload pieces
// ---------------------------------------------------------------------------

/// Completed/total scene counters attached to a running event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneProgress {
    pub completed: usize,
    pub total: usize,
}

/// A finished per-scene artifact, addressed by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub scene_id: SceneId,
    pub url: String,
    /// Narration text, set for voice artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// Everything a stage worker can report.
///
/// `StageReady`, `StageError`, `RunComplete` and `RunError` are terminal:
/// a progress stream ends after delivering one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Work is under way.
    StageRunning {
        stage: Stage,
        detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<SceneProgress>,
    },

    /// The stage finished its work; a ready or complete marker follows.
    StageDone { stage: Stage, detail: String },

    /// The stage failed. Earlier stage outputs are untouched.
    StageError { stage: Stage, detail: String },

    /// The stage's artifacts are available for review.
    StageReady {
        stage: Stage,
        artifacts: Vec<ArtifactRef>,
    },

    /// The final video exists.
    RunComplete { video_url: String },

    /// A failure that could not be attributed to a stage.
    RunError { detail: String },
}

impl ProgressEvent {
    pub fn running(stage: Stage, detail: impl Into<String>) -> Self {
        ProgressEvent::StageRunning {
            stage,
            detail: detail.into(),
            progress: None,
        }
    }

    pub fn running_with(stage: Stage, detail: impl Into<String>, completed: usize, total: usize) -> Self {
        ProgressEvent::StageRunning {
            stage,
            detail: detail.into(),
            progress: Some(SceneProgress { completed, total }),
        }
    }

    pub fn done(stage: Stage, detail: impl Into<String>) -> Self {
        ProgressEvent::StageDone {
            stage,
            detail: detail.into(),
        }
    }

    pub fn error(stage: Stage, detail: impl Into<String>) -> Self {
        ProgressEvent::StageError {
            stage,
            detail: detail.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::StageReady { .. }
                | ProgressEvent::StageError { .. }
                | ProgressEvent::RunComplete { .. }
                | ProgressEvent::RunError { .. }
        )
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProgressEvent::StageRunning { stage, .. }
            | ProgressEvent::StageDone { stage, .. }
            | ProgressEvent::StageError { stage, .. }
            | ProgressEvent::StageReady { stage, .. } => Some(*stage),
            ProgressEvent::RunComplete { .. } => Some(Stage::Compose),
            ProgressEvent::RunError { .. } => None,
        }
    }

    /// Status string clients switch on.
    pub fn status(&self) -> &'static str {
        match self {
            ProgressEvent::StageRunning { .. } => "running",
            ProgressEvent::StageDone { .. } => "done",
            ProgressEvent::StageError { .. } | ProgressEvent::RunError { .. } => "error",
            ProgressEvent::StageReady { stage, .. } => stage.ready_status().unwrap_or("ready"),
            ProgressEvent::RunComplete { .. } => "complete",
        }
    }

    /// Flatten into the wire shape streamed to clients.
    pub fn to_wire(&self) -> WireEvent<'_> {
        let stage = self.stage();
        let mut wire = WireEvent {
            step: stage.map(Stage::number),
            step_name: stage.map(Stage::name),
            total_steps: TOTAL_STAGES,
            status: self.status(),
            detail: None,
            scene: None,
            total_scenes: None,
            images: None,
            videos: None,
            voices: None,
            video_url: None,
        };

        match self {
            ProgressEvent::StageRunning {
                detail, progress, ..
            } => {
                wire.detail = Some(detail);
                if let Some(p) = progress {
                    wire.scene = Some(p.completed);
                    wire.total_scenes = Some(p.total);
                }
            }
            ProgressEvent::StageDone { detail, .. }
            | ProgressEvent::StageError { detail, .. }
            | ProgressEvent::RunError { detail } => wire.detail = Some(detail),
            ProgressEvent::StageReady { stage, artifacts } => match stage {
                Stage::Image => wire.images = Some(artifacts),
                Stage::Video => wire.videos = Some(artifacts),
                Stage::Voice => wire.voices = Some(artifacts),
                Stage::Script | Stage::Compose => {}
            },
            ProgressEvent::RunComplete { video_url } => wire.video_url = Some(video_url),
        }

        wire
    }
}

/// Client-facing event payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_name: Option<&'static str>,
    pub total_steps: u8,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_scenes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<&'a [ArtifactRef]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub videos: Option<&'a [ArtifactRef]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voices: Option<&'a [ArtifactRef]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
