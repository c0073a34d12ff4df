//! Collaborator interfaces for the external generation services.
//!
//! The orchestrator only talks to providers through these traits. Network
//! clients live outside this workspace; [`unconfigured`] fills the slots
//! when none are wired in, and [`placeholder`] renders the deterministic
//! artifacts used by mock runs.

pub mod error;
pub mod mock;
pub mod placeholder;
pub mod unconfigured;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reel_core::script::{Scene, Script, ScriptRequest};
use reel_core::voice::VoiceSettings;

pub use error::{ErrorCategory, ProviderError};

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ScriptProvider: Send + Sync {
    /// Write a script for a theme within the request's constraints.
    async fn generate_script(&self, request: &ScriptRequest) -> Result<Script, ProviderError>;
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate one still for `scene` from `prompt` and write it to `output`.
    ///
    /// The prompt is final: the orchestrator has already applied any
    /// instruction or retry simplification.
    async fn generate_image(
        &self,
        scene: &Scene,
        prompt: &str,
        output: &Path,
    ) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------
// Video (long-running operations)
// ---------------------------------------------------------------------------

/// Provider-side reference to a started video job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId(pub String);

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a video job as reported by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Succeeded,
    Failed(String),
}

/// Parameters for starting one clip.
#[derive(Debug, Clone, Copy)]
pub struct VideoRequest<'a> {
    pub scene: &'a Scene,
    /// Still to animate.
    pub image: &'a Path,
    pub instruction: Option<&'a str>,
    /// Clip length the provider should render, in seconds.
    pub clip_secs: u32,
}

/// Clip length to request for a scene of the given duration.
///
/// Providers only render 5 s or 8 s clips.
pub fn clip_secs_for(duration_sec: f64) -> u32 {
    if duration_sec >= 6.0 {
        8
    } else {
        5
    }
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Start a job. Must return quickly; rendering happens provider-side.
    async fn start(&self, request: VideoRequest<'_>) -> Result<OperationId, ProviderError>;

    /// Check a job's status once.
    async fn poll(&self, operation: &OperationId) -> Result<OperationStatus, ProviderError>;

    /// Download a finished job's clip to `output`.
    ///
    /// Returns [`ProviderError::NoOutput`] if the job finished without a
    /// usable clip.
    async fn retrieve(&self, operation: &OperationId, output: &Path) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Parameters for one narration recording.
#[derive(Debug, Clone, Copy)]
pub struct VoiceRequest<'a> {
    /// Narration text, including any emotion prefix.
    pub text: &'a str,
    pub voice_id: &'a str,
    /// Already clamped to the provider's accepted ranges.
    pub settings: VoiceSettings,
}

#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Synthesize narration and write a WAV file to `output`.
    async fn synthesize(&self, request: VoiceRequest<'_>, output: &Path) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------
// Provider set
// ---------------------------------------------------------------------------

/// The four collaborators a pipeline needs.
#[derive(Clone)]
pub struct Providers {
    pub script: Arc<dyn ScriptProvider>,
    pub image: Arc<dyn ImageProvider>,
    pub video: Arc<dyn VideoProvider>,
    pub voice: Arc<dyn VoiceProvider>,
}

impl Providers {
    /// A set whose every call fails with a fatal "not configured" error.
    ///
    /// Mock runs never reach the providers, so this is enough to serve them.
    pub fn unconfigured() -> Self {
        let provider = Arc::new(unconfigured::UnconfiguredProvider);
        Self {
            script: provider.clone(),
            image: provider.clone(),
            video: provider.clone(),
            voice: provider,
        }
    }
}
