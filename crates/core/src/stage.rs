//! The five pipeline stages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of stages in a full run.
pub const TOTAL_STAGES: u8 = 5;

/// One phase of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Script,
    Image,
    Video,
    Voice,
    Compose,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Script,
        Stage::Image,
        Stage::Video,
        Stage::Voice,
        Stage::Compose,
    ];

    /// 1-based position of the stage.
    pub fn number(self) -> u8 {
        match self {
            Stage::Script => 1,
            Stage::Image => 2,
            Stage::Video => 3,
            Stage::Voice => 4,
            Stage::Compose => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Script => "script",
            Stage::Image => "image",
            Stage::Video => "video",
            Stage::Voice => "voice",
            Stage::Compose => "compose",
        }
    }

    /// Status marker sent when the stage's artifacts are ready for review.
    ///
    /// Script and compose have no review marker: the script is returned
    /// synchronously and compose ends the run with `complete`.
    pub fn ready_status(self) -> Option<&'static str> {
        match self {
            Stage::Image => Some("images_ready"),
            Stage::Video => Some("videos_ready"),
            Stage::Voice => Some("voices_ready"),
            Stage::Script | Stage::Compose => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
