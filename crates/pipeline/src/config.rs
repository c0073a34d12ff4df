use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Tunables shared by every stage worker.
///
/// Concurrency caps reflect provider rate limits, so each call site has
/// its own.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root under which each run owns `{run_id}/`.
    pub output_root: PathBuf,
    /// Parallel image generations (full stage and partial regeneration).
    pub image_concurrency: usize,
    /// Parallel single-scene video regenerations.
    pub video_regen_concurrency: usize,
    /// Parallel voice syntheses.
    pub voice_concurrency: usize,
    /// Pause between video polling passes.
    pub video_poll_interval: Duration,
    /// Wall-clock budget shared by every handle of one polling invocation.
    pub video_poll_budget: Duration,
    /// Idle wait before a progress stream emits a keepalive.
    pub progress_keepalive: Duration,
    /// Size of placeholder stills and clips.
    pub frame_width: u32,
    pub frame_height: u32,
    pub image_retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./output"),
            image_concurrency: 5,
            video_regen_concurrency: 3,
            voice_concurrency: 1,
            video_poll_interval: Duration::from_secs(5),
            video_poll_budget: Duration::from_secs(600),
            progress_keepalive: Duration::from_secs(30),
            frame_width: 1080,
            frame_height: 1920,
            image_retry: RetryPolicy::default(),
        }
    }
}
