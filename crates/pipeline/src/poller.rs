//! Long-running provider operations (video clips).
//!
//! Every job is started up front, then all pending handles are checked in
//! one pass per interval until they finish or a single wall-clock budget
//! runs out. Finished jobs are retrieved last. The call either returns one
//! clip per job, in job order, or a report naming which scenes timed out,
//! which failed, and which clips were retrieved anyway.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reel_core::script::Scene;
use reel_core::types::SceneId;
use reel_providers::{
    clip_secs_for, OperationId, OperationStatus, ProviderError, VideoProvider, VideoRequest,
};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Inputs / outcome
// ---------------------------------------------------------------------------

/// One clip to generate.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub scene: Scene,
    pub image: PathBuf,
    pub output: PathBuf,
    pub instruction: Option<String>,
}

/// Where each scene ended up when a polling invocation did not fully
/// succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Clips written to disk.
    pub retrieved: Vec<SceneId>,
    /// Still pending when the budget ran out.
    pub timed_out: Vec<SceneId>,
    /// Reported failed by the provider, or finished with nothing usable.
    pub failed: Vec<(SceneId, String)>,
}

impl PollReport {
    pub fn is_timeout(&self) -> bool {
        !self.timed_out.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.timed_out.is_empty() && self.failed.is_empty()
    }
}

impl fmt::Display for PollReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.timed_out.is_empty() {
            parts.push(format!("timed out: scenes {:?}", self.timed_out));
        }
        for (scene_id, reason) in &self.failed {
            parts.push(format!("scene {scene_id} failed: {reason}"));
        }
        parts.push(format!("retrieved: scenes {:?}", self.retrieved));
        f.write_str(&parts.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Jobs in `abandoned` were started before the failure and are left
    /// running provider-side.
    #[error("failed to start video job for scene {scene_id}: {source}")]
    Start {
        scene_id: SceneId,
        #[source]
        source: ProviderError,
        abandoned: Vec<SceneId>,
    },

    #[error("video jobs did not all complete ({0})")]
    Incomplete(PollReport),
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum HandleState {
    Pending,
    Done,
    Failed(String),
}

/// A started job, owned by one poller invocation.
#[derive(Debug)]
struct OperationHandle {
    scene_id: SceneId,
    operation: OperationId,
    output: PathBuf,
    state: HandleState,
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Shared-schedule poller with one global budget.
#[derive(Debug, Clone, Copy)]
pub struct LongOperationPoller {
    interval: Duration,
    budget: Duration,
}

impl LongOperationPoller {
    pub fn new(interval: Duration, budget: Duration) -> Self {
        Self { interval, budget }
    }

    /// Start, poll and retrieve every job.
    ///
    /// `on_progress(finished, total)` fires once per polling pass in which
    /// at least one handle changed state.
    pub async fn run<P>(
        &self,
        provider: &dyn VideoProvider,
        jobs: &[VideoJob],
        mut on_progress: P,
    ) -> Result<Vec<PathBuf>, PollError>
    where
        P: FnMut(usize, usize),
    {
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        // Start phase: all jobs before any polling.
        let mut handles: Vec<OperationHandle> = Vec::with_capacity(total);
        for job in jobs {
            let request = VideoRequest {
                scene: &job.scene,
                image: &job.image,
                instruction: job.instruction.as_deref(),
                clip_secs: clip_secs_for(job.scene.duration_sec),
            };
            let operation = match provider.start(request).await {
                Ok(operation) => operation,
                Err(source) => {
                    let abandoned: Vec<SceneId> = handles.iter().map(|h| h.scene_id).collect();
                    if !abandoned.is_empty() {
                        tracing::warn!(
                            scene_id = job.scene.scene_id,
                            abandoned = ?abandoned,
                            "Video job failed to start, abandoning jobs already started",
                        );
                    }
                    return Err(PollError::Start {
                        scene_id: job.scene.scene_id,
                        source,
                        abandoned,
                    });
                }
            };
            tracing::info!(
                scene_id = job.scene.scene_id,
                operation = %operation,
                clip_secs = request.clip_secs,
                "Video job started",
            );
            handles.push(OperationHandle {
                scene_id: job.scene.scene_id,
                operation,
                output: job.output.clone(),
                state: HandleState::Pending,
            });
        }

        // Poll phase.
        let deadline = Instant::now() + self.budget;
        let mut finished = 0usize;
        loop {
            let mut changed = false;
            for handle in handles
                .iter_mut()
                .filter(|h| h.state == HandleState::Pending)
            {
                match provider.poll(&handle.operation).await {
                    Ok(OperationStatus::Pending) => {}
                    Ok(OperationStatus::Succeeded) => {
                        handle.state = HandleState::Done;
                        finished += 1;
                        changed = true;
                        tracing::info!(
                            scene_id = handle.scene_id,
                            completed = finished,
                            total,
                            "Video job finished",
                        );
                    }
                    Ok(OperationStatus::Failed(reason)) => {
                        tracing::warn!(scene_id = handle.scene_id, %reason, "Video job failed");
                        handle.state = HandleState::Failed(reason);
                        finished += 1;
                        changed = true;
                    }
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(
                            scene_id = handle.scene_id,
                            error = %e,
                            "Video poll failed, will check again next pass",
                        );
                    }
                    Err(e) => {
                        handle.state = HandleState::Failed(e.to_string());
                        finished += 1;
                        changed = true;
                    }
                }
            }

            if changed {
                on_progress(finished, total);
            }
            if finished == total {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    completed = finished,
                    total,
                    budget_secs = self.budget.as_secs(),
                    "Video polling budget exhausted",
                );
                break;
            }
            tracing::debug!(completed = finished, total, "Video jobs still running");
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }

        // Retrieval phase.
        let mut report = PollReport::default();
        for handle in &handles {
            match &handle.state {
                HandleState::Pending => report.timed_out.push(handle.scene_id),
                HandleState::Failed(reason) => report.failed.push((handle.scene_id, reason.clone())),
                HandleState::Done => {
                    match provider.retrieve(&handle.operation, &handle.output).await {
                        Ok(()) => report.retrieved.push(handle.scene_id),
                        Err(e) => report.failed.push((handle.scene_id, e.to_string())),
                    }
                }
            }
        }

        if report.is_complete() {
            Ok(handles.into_iter().map(|h| h.output).collect())
        } else {
            Err(PollError::Incomplete(report))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
