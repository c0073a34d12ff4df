//! Script and scene model.
//!
//! A script is the ordered list of scenes every later stage works from.
//! Scene ids are the only stable join key between stages; positions may
//! change when cuts are reordered.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::SceneId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fewest scenes a generated script should contain.
pub const SCENE_COUNT_MIN: usize = 3;

/// Most scenes a generated script should contain.
pub const SCENE_COUNT_MAX: usize = 6;

/// Target video length when the caller does not specify one.
pub const DEFAULT_DURATION_SECS: u32 = 45;

// ---------------------------------------------------------------------------
// Scene / Script
// ---------------------------------------------------------------------------

/// One narration + visual unit of the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: SceneId,
    /// Narration text, also used as the caption.
    pub text: String,
    pub image_prompt: String,
    /// Target on-screen duration in seconds.
    pub duration_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    pub scenes: Vec<Scene>,
}

impl Script {
    /// Check structural invariants: non-empty, unique positive ids,
    /// positive durations, non-blank narration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scenes.is_empty() {
            return Err(CoreError::Validation(
                "script must contain at least one scene".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.scenes.len());
        for scene in &self.scenes {
            if scene.scene_id == 0 {
                return Err(CoreError::Validation("scene_id must be >= 1".into()));
            }
            if !seen.insert(scene.scene_id) {
                return Err(CoreError::Validation(format!(
                    "duplicate scene_id {}",
                    scene.scene_id
                )));
            }
            if !(scene.duration_sec.is_finite() && scene.duration_sec > 0.0) {
                return Err(CoreError::Validation(format!(
                    "scene {} must have a positive duration",
                    scene.scene_id
                )));
            }
            if scene.text.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "scene {} has no narration text",
                    scene.scene_id
                )));
            }
        }
        Ok(())
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn scene_ids(&self) -> Vec<SceneId> {
        self.scenes.iter().map(|s| s.scene_id).collect()
    }

    /// Position of a scene in script order.
    pub fn position_of(&self, scene_id: SceneId) -> Option<usize> {
        self.scenes.iter().position(|s| s.scene_id == scene_id)
    }

    /// Sum of the declared scene durations.
    pub fn total_duration(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration_sec).sum()
    }

    /// Resolve target scene ids to positions, failing on the first id the
    /// script does not contain. Duplicate ids collapse to one position and
    /// the result is sorted by position.
    pub fn resolve_targets(&self, targets: &[SceneId]) -> Result<Vec<usize>, CoreError> {
        let mut positions = Vec::with_capacity(targets.len());
        for &id in targets {
            let pos = self.position_of(id).ok_or_else(|| {
                CoreError::Validation(format!("scene_id {id} is not part of the script"))
            })?;
            positions.push(pos);
        }
        positions.sort_unstable();
        positions.dedup();
        Ok(positions)
    }

    /// Apply narration and emotion overrides keyed by scene id.
    ///
    /// All ids are checked before anything is modified.
    pub fn apply_overrides(
        &mut self,
        texts: &BTreeMap<SceneId, String>,
        emotions: &BTreeMap<SceneId, String>,
    ) -> Result<(), CoreError> {
        let ids: Vec<SceneId> = texts.keys().chain(emotions.keys()).copied().collect();
        self.resolve_targets(&ids)?;

        if texts.values().any(|t| t.trim().is_empty()) {
            return Err(CoreError::Validation(
                "narration text overrides must not be blank".into(),
            ));
        }

        for scene in &mut self.scenes {
            if let Some(text) = texts.get(&scene.scene_id) {
                scene.text = text.clone();
            }
            if let Some(emotion) = emotions.get(&scene.scene_id) {
                scene.emotion = if emotion.trim().is_empty() {
                    None
                } else {
                    Some(emotion.clone())
                };
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Script request
// ---------------------------------------------------------------------------

/// Narration register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    DesuMasu,
    DaDearu,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstPerson {
    #[default]
    Watashi,
    Ore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondPerson {
    #[default]
    Anata,
}

/// Everything the script provider needs to write a script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub theme: String,
    #[serde(default = "default_duration", alias = "duration")]
    pub duration_secs: u32,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub first_person: FirstPerson,
    #[serde(default)]
    pub second_person: SecondPerson,
    #[serde(default)]
    pub reference_script: Option<String>,
    #[serde(default = "default_min_scenes")]
    pub min_scenes: usize,
    #[serde(default = "default_max_scenes")]
    pub max_scenes: usize,
    /// Narration voice for the run. `None` selects the first catalogue voice.
    #[serde(default)]
    pub voice_id: Option<String>,
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_SECS
}

fn default_min_scenes() -> usize {
    SCENE_COUNT_MIN
}

fn default_max_scenes() -> usize {
    SCENE_COUNT_MAX
}

impl ScriptRequest {
    pub fn new(theme: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            duration_secs: DEFAULT_DURATION_SECS,
            tone: Tone::default(),
            first_person: FirstPerson::default(),
            second_person: SecondPerson::default(),
            reference_script: None,
            min_scenes: SCENE_COUNT_MIN,
            max_scenes: SCENE_COUNT_MAX,
            voice_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.theme.trim().is_empty() {
            return Err(CoreError::Validation("theme is required".into()));
        }
        if self.duration_secs == 0 {
            return Err(CoreError::Validation("duration must be positive".into()));
        }
        if self.min_scenes == 0 || self.min_scenes > self.max_scenes {
            return Err(CoreError::Validation(format!(
                "invalid scene count window {}..={}",
                self.min_scenes, self.max_scenes
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
