//! Narration tempo fitting.
//!
//! ffmpeg's `atempo` filter only accepts ratios in `0.5..=2.0` per
//! application, so larger speed-ups are expressed as a chain of filters
//! whose product equals the required ratio.

/// Headroom subtracted from the target so fitted audio ends slightly early.
pub const TEMPO_MARGIN_SECS: f64 = 0.3;

/// Largest ratio a single `atempo` step may apply.
pub const MAX_STEP_RATIO: f64 = 2.0;

/// Smallest ratio a single `atempo` step may apply.
pub const MIN_STEP_RATIO: f64 = 0.5;

/// A planned speed-up of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoPlan {
    /// Overall speed-up ratio (`> 1.0`).
    pub ratio: f64,
    /// Per-step ratios, each within `MIN_STEP_RATIO..=MAX_STEP_RATIO`.
    pub steps: Vec<f64>,
}

impl TempoPlan {
    /// Render the chain as an ffmpeg `-af` argument.
    pub fn filter(&self) -> String {
        self.steps
            .iter()
            .map(|s| {
                if (*s - MAX_STEP_RATIO).abs() < f64::EPSILON {
                    "atempo=2.0".to_string()
                } else {
                    format!("atempo={s:.4}")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Product of all step ratios.
    pub fn combined_ratio(&self) -> f64 {
        self.steps.iter().product()
    }

    /// Duration of a recording of `current` seconds after the chain runs.
    pub fn fitted_duration(&self, current: f64) -> f64 {
        current / self.combined_ratio()
    }
}

/// Plan the tempo change needed to fit `current` seconds of audio into
/// `target` seconds.
///
/// Returns `None` when the recording already fits or either duration is
/// not a positive number.
pub fn plan_tempo(current: f64, target: f64) -> Option<TempoPlan> {
    if !(current.is_finite() && target.is_finite()) || current <= 0.0 || target <= 0.0 {
        return None;
    }
    if current <= target {
        return None;
    }

    let effective_target = if target > TEMPO_MARGIN_SECS {
        target - TEMPO_MARGIN_SECS
    } else {
        target
    };
    let ratio = current / effective_target;

    let mut steps = Vec::new();
    let mut remaining = ratio;
    while remaining > MAX_STEP_RATIO {
        steps.push(MAX_STEP_RATIO);
        remaining /= MAX_STEP_RATIO;
    }
    // A remainder of exactly 1.0 is a no-op step.
    if remaining > 1.0 {
        steps.push(remaining);
    }

    Some(TempoPlan { ratio, steps })
}
