//! FFmpeg/FFprobe invocation.
//!
//! Argument vectors come from [`crate::composition`]; this module only runs
//! the binaries and interprets their output.

use std::ffi::OsString;
use std::path::Path;

use serde::Deserialize;

/// Longest stderr tail kept in an error.
const MAX_STDERR_CHARS: usize = 4000;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("media file not found: {0}")]
    FileNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffmpeg` with the given arguments, failing on a non-zero exit.
///
/// The child is killed if the returned future is dropped, so a cancelled
/// stage does not leave encoders running.
pub async fn run_ffmpeg(args: &[OsString]) -> Result<(), FfmpegError> {
    let output = tokio::process::Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error"])
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    Ok(())
}

/// Run `ffprobe` on a media file and return the parsed JSON output.
pub async fn probe(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::FileNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Duration of a media file in seconds.
pub async fn probe_duration(path: &Path) -> Result<f64, FfmpegError> {
    let probe = probe(path).await?;
    parse_duration(&probe).ok_or_else(|| {
        FfmpegError::ParseError(format!("no duration reported for {}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse the duration in seconds from ffprobe output.
///
/// Prefers the container duration and falls back to the first stream
/// that reports one.
pub fn parse_duration(probe: &FfprobeOutput) -> Option<f64> {
    let parse = |d: &Option<String>| d.as_deref().and_then(|s| s.trim().parse::<f64>().ok());

    parse(&probe.format.duration)
        .or_else(|| probe.streams.iter().find_map(|s| parse(&s.duration)))
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Keep the end of stderr, where ffmpeg reports the actual failure.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= MAX_STDERR_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - MAX_STDERR_CHARS).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
