use reel_core::error::CoreError;
use reel_core::ffmpeg::FfmpegError;
use reel_core::types::SceneId;
use reel_providers::placeholder::PlaceholderError;
use reel_providers::ProviderError;
use reel_store::StoreError;

use crate::poller::{PollError, PollReport};

/// Why a stage worker failed.
///
/// Every variant ends up as the detail of a stage error event, so the
/// messages are written for the person watching the progress stream.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("scene {scene_id}: {source}")]
    Provider {
        scene_id: SceneId,
        #[source]
        source: ProviderError,
    },

    #[error("video generation failed ({0})")]
    Operations(PollReport),

    #[error("video generation timed out ({0})")]
    Timeout(PollReport),

    #[error("media tool failed: {0}")]
    Tool(#[from] FfmpegError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    pub fn provider(scene_id: SceneId, source: ProviderError) -> Self {
        PipelineError::Provider { scene_id, source }
    }
}

impl From<PollError> for PipelineError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::Start {
                scene_id, source, ..
            } => PipelineError::Provider { scene_id, source },
            PollError::Incomplete(report) if report.is_timeout() => PipelineError::Timeout(report),
            PollError::Incomplete(report) => PipelineError::Operations(report),
        }
    }
}

impl From<PlaceholderError> for PipelineError {
    fn from(err: PlaceholderError) -> Self {
        match err {
            PlaceholderError::Ffmpeg(e) => PipelineError::Tool(e),
            other => PipelineError::Internal(other.to_string()),
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => PipelineError::Validation(msg),
            other => PipelineError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn incomplete_poll_with_stuck_scene_is_a_timeout() {
        let report = PollReport {
            retrieved: vec![1, 3],
            timed_out: vec![2],
            failed: vec![],
        };
        let err = PipelineError::from(PollError::Incomplete(report));
        assert_matches!(&err, PipelineError::Timeout(r) => assert_eq!(r.timed_out, vec![2]));
        let msg = err.to_string();
        assert!(msg.contains("timed out: scenes [2]"));
        assert!(msg.contains("retrieved: scenes [1, 3]"));
    }

    #[test]
    fn incomplete_poll_without_stuck_scene_is_an_operation_failure() {
        let report = PollReport {
            retrieved: vec![],
            timed_out: vec![],
            failed: vec![(1, "blocked".into())],
        };
        assert_matches!(
            PipelineError::from(PollError::Incomplete(report)),
            PipelineError::Operations(_)
        );
    }

    #[test]
    fn start_failure_names_the_scene() {
        let err = PipelineError::from(PollError::Start {
            scene_id: 4,
            source: ProviderError::Fatal("quota".into()),
            abandoned: vec![1, 2, 3],
        });
        assert_matches!(err, PipelineError::Provider { scene_id: 4, .. });
    }
}
