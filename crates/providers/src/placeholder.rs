//! Deterministic stand-in artifacts for mock runs.
//!
//! Stills are flat colour fields, narration is a short beep followed by
//! silence, and clips are the still rendered with a slow zoom.

use std::path::Path;

use image::{Rgb, RgbImage};
use reel_core::composition::frozen_clip_args;
use reel_core::ffmpeg::{run_ffmpeg, FfmpegError};
use reel_core::types::SceneId;

/// Sample rate of placeholder narration.
pub const PLACEHOLDER_SAMPLE_RATE: u32 = 24_000;

const BEEP_HZ: f64 = 440.0;
const BEEP_SECS: f64 = 0.1;
const BEEP_AMPLITUDE: f64 = 3000.0;

/// Colours cycled through by scene id.
const PALETTE: [[u8; 3]; 5] = [
    [70, 130, 180],
    [60, 179, 113],
    [218, 165, 32],
    [205, 92, 92],
    [147, 112, 219],
];

#[derive(Debug, thiserror::Error)]
pub enum PlaceholderError {
    #[error("failed to encode placeholder image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to write placeholder audio: {0}")]
    Audio(#[from] hound::Error),

    #[error("failed to render placeholder clip: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("placeholder task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Palette colour for a scene. Ids start at 1.
pub fn scene_color(scene_id: SceneId) -> [u8; 3] {
    PALETTE[(scene_id.saturating_sub(1) as usize) % PALETTE.len()]
}

/// Write a flat PNG in the scene's colour.
pub async fn write_placeholder_image(
    scene_id: SceneId,
    width: u32,
    height: u32,
    output: &Path,
) -> Result<(), PlaceholderError> {
    let output = output.to_path_buf();
    let color = Rgb(scene_color(scene_id));
    tokio::task::spawn_blocking(move || {
        RgbImage::from_pixel(width, height, color).save_with_format(&output, image::ImageFormat::Png)
    })
    .await??;
    tracing::debug!(scene_id, width, height, "Placeholder image written");
    Ok(())
}

/// Number of samples for a recording of `duration_secs`.
pub fn sample_count(duration_secs: f64) -> u32 {
    (duration_secs.max(0.0) * PLACEHOLDER_SAMPLE_RATE as f64).round() as u32
}

/// Write 16-bit mono narration: a short 440 Hz beep, then silence.
pub async fn write_placeholder_voice(duration_secs: f64, output: &Path) -> Result<(), PlaceholderError> {
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: PLACEHOLDER_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&output, spec)?;
        let rate = PLACEHOLDER_SAMPLE_RATE as f64;
        for i in 0..sample_count(duration_secs) {
            let t = i as f64 / rate;
            let value = if t < BEEP_SECS {
                (BEEP_AMPLITUDE * (2.0 * std::f64::consts::PI * BEEP_HZ * t).sin()) as i16
            } else {
                0
            };
            writer.write_sample(value)?;
        }
        writer.finalize()
    })
    .await??;
    Ok(())
}

/// Render a still into a silent clip of the given length.
pub async fn render_frozen_clip(
    image: &Path,
    duration_secs: f64,
    width: u32,
    height: u32,
    output: &Path,
) -> Result<(), PlaceholderError> {
    run_ffmpeg(&frozen_clip_args(image, duration_secs, width, height, output)).await?;
    tracing::debug!(output = %output.display(), duration_secs, "Placeholder clip rendered");
    Ok(())
}
