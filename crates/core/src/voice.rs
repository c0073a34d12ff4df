//! Narration settings and voice catalogue.

use serde::{Deserialize, Serialize};

use crate::script::Scene;

/// Allowed prosody speed range.
pub const SPEED_RANGE: (f64, f64) = (0.5, 2.0);

/// Allowed prosody volume range in dB.
pub const VOLUME_RANGE: (f64, f64) = (-20.0, 20.0);

/// A selectable narration voice.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VoiceOption {
    pub id: &'static str,
    pub label: &'static str,
}

/// Voices offered to clients. The first entry is the default.
pub const VOICES: &[VoiceOption] = &[
    VoiceOption {
        id: "9c51d76d1bfa4a3a864bee5c56c4e096",
        label: "Voice 1",
    },
    VoiceOption {
        id: "71bf4cb71cd44df6aa603d51db8f92ff",
        label: "Nanamin",
    },
];

pub fn default_voice_id() -> &'static str {
    VOICES[0].id
}

/// Prosody applied to every scene of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub speed: f64,
    pub volume: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            volume: 0.0,
        }
    }
}

impl VoiceSettings {
    /// Clamp both values into the ranges the voice provider accepts.
    /// Non-finite inputs fall back to the defaults.
    pub fn clamped(self) -> Self {
        let defaults = Self::default();
        let speed = if self.speed.is_finite() {
            self.speed.clamp(SPEED_RANGE.0, SPEED_RANGE.1)
        } else {
            defaults.speed
        };
        let volume = if self.volume.is_finite() {
            self.volume.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1)
        } else {
            defaults.volume
        };
        Self { speed, volume }
    }

    /// Overlay optional overrides on top of the stored settings.
    pub fn with_overrides(self, speed: Option<f64>, volume: Option<f64>) -> Self {
        Self {
            speed: speed.unwrap_or(self.speed),
            volume: volume.unwrap_or(self.volume),
        }
        .clamped()
    }
}

/// Text sent to the voice provider for a scene.
///
/// An emotion tag is prefixed as `(emotion) ` unless the narration already
/// opens with a parenthesised marker.
pub fn narration_input(scene: &Scene) -> String {
    match scene.emotion.as_deref().map(str::trim) {
        Some(emotion) if !emotion.is_empty() && !scene.text.starts_with('(') => {
            format!("({emotion}) {}", scene.text)
        }
        _ => scene.text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(text: &str, emotion: Option<&str>) -> Scene {
        Scene {
            scene_id: 1,
            text: text.into(),
            image_prompt: String::new(),
            duration_sec: 5.0,
            emotion: emotion.map(Into::into),
        }
    }

    #[test]
    fn clamps_out_of_range_values() {
        let s = VoiceSettings {
            speed: 3.0,
            volume: -50.0,
        }
        .clamped();
        assert_eq!(s.speed, 2.0);
        assert_eq!(s.volume, -20.0);
    }

    #[test]
    fn overrides_keep_unspecified_fields() {
        let stored = VoiceSettings {
            speed: 1.2,
            volume: 3.0,
        };
        let s = stored.with_overrides(None, Some(-1.0));
        assert_eq!(s.speed, 1.2);
        assert_eq!(s.volume, -1.0);
    }

    #[test]
    fn emotion_is_prefixed() {
        assert_eq!(narration_input(&scene("hello", Some("happy"))), "(happy) hello");
    }

    #[test]
    fn existing_marker_is_left_alone() {
        assert_eq!(
            narration_input(&scene("(sad) hello", Some("happy"))),
            "(sad) hello"
        );
        assert_eq!(narration_input(&scene("hello", Some(" "))), "hello");
    }
}
