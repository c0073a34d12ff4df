//! Video stage: one clip per scene, animated from the scene's image.

use std::path::PathBuf;

use reel_core::script::Scene;
use reel_core::stage::Stage;
use reel_events::ProgressEvent;
use reel_providers::placeholder::render_frozen_clip;

use crate::error::PipelineError;
use crate::fanout::FanOut;
use crate::poller::{LongOperationPoller, VideoJob};
use crate::stages::StageContext;

/// One clip to produce.
#[derive(Debug, Clone)]
pub struct VideoTask {
    pub scene: Scene,
    /// Still the clip is animated from.
    pub image: PathBuf,
    pub instruction: Option<String>,
}

impl VideoTask {
    fn into_job(self, ctx: &StageContext) -> VideoJob {
        VideoJob {
            output: ctx.layout.video(self.scene.scene_id),
            scene: self.scene,
            image: self.image,
            instruction: self.instruction,
        }
    }
}

fn poller(ctx: &StageContext) -> LongOperationPoller {
    LongOperationPoller::new(ctx.config.video_poll_interval, ctx.config.video_poll_budget)
}

/// Generate a clip for every task on one shared polling schedule.
pub async fn generate_videos(
    ctx: &StageContext,
    tasks: Vec<VideoTask>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let total = tasks.len();
    ctx.running(Stage::Video, format!("Generating {total} clips"));
    tracing::info!(run_id = %ctx.run_id, total, mock = ctx.mock, "Video stage started");

    let paths = if ctx.mock {
        let mut paths = Vec::with_capacity(total);
        for (i, task) in tasks.into_iter().enumerate() {
            paths.push(mock_clip(ctx, task).await?);
            ctx.scene_done(Stage::Video, "Clip", i + 1, total);
        }
        paths
    } else {
        let jobs: Vec<VideoJob> = tasks.into_iter().map(|t| t.into_job(ctx)).collect();
        poller(ctx)
            .run(ctx.providers.video.as_ref(), &jobs, |completed, total| {
                ctx.scene_done(Stage::Video, "Clip", completed, total)
            })
            .await?
    };

    ctx.emit(ProgressEvent::done(Stage::Video, format!("{total} clips generated")));
    Ok(paths)
}

/// Regenerate selected clips, each as its own polling invocation.
pub async fn regenerate_videos(
    ctx: &StageContext,
    tasks: Vec<VideoTask>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let total = tasks.len();
    ctx.running(Stage::Video, format!("Regenerating {total} clips"));
    tracing::info!(run_id = %ctx.run_id, total, mock = ctx.mock, "Video regeneration started");

    let fan = FanOut::new(ctx.config.video_regen_concurrency).with_parent(&ctx.cancel);
    let paths = fan
        .run(
            tasks,
            |_, task, _| async move {
                if ctx.mock {
                    return mock_clip(ctx, task).await;
                }
                let job = task.into_job(ctx);
                let mut clips = poller(ctx)
                    .run(ctx.providers.video.as_ref(), std::slice::from_ref(&job), |_, _| {})
                    .await?;
                clips
                    .pop()
                    .ok_or_else(|| PipelineError::Internal("poller returned no clip".into()))
            },
            |completed, total| ctx.scene_done(Stage::Video, "Clip", completed, total),
        )
        .await?;

    ctx.emit(ProgressEvent::done(Stage::Video, format!("{total} clips regenerated")));
    Ok(paths)
}

async fn mock_clip(ctx: &StageContext, task: VideoTask) -> Result<PathBuf, PipelineError> {
    let output = ctx.layout.video(task.scene.scene_id);
    render_frozen_clip(
        &task.image,
        task.scene.duration_sec,
        ctx.config.frame_width,
        ctx.config.frame_height,
        &output,
    )
    .await?;
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::poller::tests::{Plan, ScriptedVideo};
    use crate::stages::testing::{context, counters, drain, script};
    use assert_matches::assert_matches;
    use reel_providers::Providers;
    use std::sync::Arc;
    use std::time::Duration;

    fn providers_with(video: Arc<ScriptedVideo>) -> Providers {
        Providers {
            video,
            ..Providers::unconfigured()
        }
    }

    fn tasks(ctx: &StageContext, n: u32) -> Vec<VideoTask> {
        script(n)
            .scenes
            .into_iter()
            .map(|scene| VideoTask {
                image: ctx.layout.image(scene.scene_id),
                scene,
                instruction: None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn clips_come_back_in_scene_order() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(ScriptedVideo::new([
            (1, Plan::DoneAfter(2)),
            (2, Plan::DoneAfter(1)),
            (3, Plan::DoneAfter(3)),
        ]));
        let (ctx, hub) = context(dir.path(), false, providers_with(video));
        let run_id = ctx.run_id.clone();

        let paths = generate_videos(&ctx, tasks(&ctx, 3)).await.unwrap();
        let expected: Vec<PathBuf> = (1..=3).map(|id| ctx.layout.video(id)).collect();
        drop(ctx);

        assert_eq!(paths, expected);
        let events = drain(&hub, &run_id).await;
        assert_eq!(counters(&events), vec![1, 2, 3]);
        assert_matches!(events.last(), Some(ProgressEvent::StageDone { stage: Stage::Video, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_scene_fails_stage_with_timeout_naming_it() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(ScriptedVideo::new([
            (1, Plan::DoneAfter(1)),
            (2, Plan::Never),
            (3, Plan::DoneAfter(1)),
        ]));
        let (mut ctx, _hub) = context(dir.path(), false, providers_with(video));
        ctx.config = Arc::new(PipelineConfig {
            video_poll_budget: Duration::from_secs(20),
            ..(*ctx.config).clone()
        });

        let err = generate_videos(&ctx, tasks(&ctx, 3)).await.unwrap_err();

        assert_matches!(&err, PipelineError::Timeout(report) => {
            assert_eq!(report.timed_out, vec![2]);
            assert_eq!(report.retrieved, vec![1, 3]);
        });
        assert!(err.to_string().contains("retrieved: scenes [1, 3]"));
    }

    #[tokio::test(start_paused = true)]
    async fn regeneration_polls_each_scene_separately() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(ScriptedVideo::new([(2, Plan::DoneAfter(2)), (3, Plan::DoneAfter(1))]));
        let (ctx, _hub) = context(dir.path(), false, providers_with(video.clone()));
        let targets: Vec<VideoTask> = tasks(&ctx, 3).into_iter().skip(1).collect();

        let paths = regenerate_videos(&ctx, targets).await.unwrap();

        assert_eq!(paths, vec![ctx.layout.video(2), ctx.layout.video(3)]);
        let mut started = video.started.lock().unwrap().clone();
        started.sort();
        assert_eq!(started, vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn regeneration_failure_surfaces_as_operation_error() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(ScriptedVideo::new([(1, Plan::Fails)]));
        let (ctx, _hub) = context(dir.path(), false, providers_with(video));
        let targets: Vec<VideoTask> = tasks(&ctx, 1);

        let err = regenerate_videos(&ctx, targets).await.unwrap_err();
        assert_matches!(err, PipelineError::Operations(report) => {
            assert_eq!(report.failed.len(), 1);
        });
    }
}
