//! Compose stage: mux each scene, then join the scenes into `final.mp4`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use reel_core::caption::{drawtext_filter, resolve_font, CaptionSettings};
use reel_core::composition::{
    compose_scene_args, concat_gap_args, concat_list, concat_simple_args, plan_concat, ConcatPlan,
    Transition,
};
use reel_core::ffmpeg::run_ffmpeg;
use reel_core::stage::Stage;
use reel_events::ProgressEvent;
use reel_store::RunLayout;

use crate::error::PipelineError;
use crate::stages::StageContext;

/// Inputs for the final assembly, all in final scene order.
#[derive(Debug, Clone, Default)]
pub struct ComposeJob {
    pub videos: Vec<PathBuf>,
    pub voices: Vec<PathBuf>,
    /// Caption text per position.
    pub captions: Vec<String>,
    pub transitions: Vec<Transition>,
    pub caption: CaptionSettings,
}

impl ComposeJob {
    fn validate(&self) -> Result<(), PipelineError> {
        let n = self.videos.len();
        if n == 0 {
            return Err(PipelineError::Validation("nothing to compose".into()));
        }
        if self.voices.len() != n || self.captions.len() != n {
            return Err(PipelineError::Validation(format!(
                "{} clips, {} narrations and {} captions do not line up",
                n,
                self.voices.len(),
                self.captions.len()
            )));
        }
        Ok(())
    }
}

/// One ffmpeg invocation per scene: `(output, args)`.
pub fn scene_commands(
    layout: &RunLayout,
    job: &ComposeJob,
    font_file: Option<&Path>,
) -> Vec<(PathBuf, Vec<OsString>)> {
    job.videos
        .iter()
        .zip(&job.voices)
        .zip(&job.captions)
        .enumerate()
        .map(|(i, ((video, voice), text))| {
            let output = layout.composed(i + 1);
            let filter = job
                .caption
                .enabled
                .then(|| drawtext_filter(text, &job.caption, font_file));
            let args = compose_scene_args(video, voice, &output, filter.as_deref());
            (output, args)
        })
        .collect()
}

/// Build `final.mp4` for the run.
pub async fn compose_final(ctx: &StageContext, job: ComposeJob) -> Result<PathBuf, PipelineError> {
    job.validate()?;
    let total = job.videos.len();
    ctx.running(Stage::Compose, format!("Composing {total} scenes"));
    tracing::info!(
        run_id = %ctx.run_id,
        total,
        caption = job.caption.enabled,
        "Compose stage started",
    );

    let font = if job.caption.enabled {
        let font = resolve_font(job.caption.font_style);
        if font.is_none() {
            tracing::warn!(style = ?job.caption.font_style, "No caption font found, using ffmpeg default");
        }
        font
    } else {
        None
    };

    let commands = scene_commands(&ctx.layout, &job, font.as_deref());
    let mut composed = Vec::with_capacity(total);
    for (i, (output, args)) in commands.into_iter().enumerate() {
        run_ffmpeg(&args).await?;
        composed.push(output);
        ctx.scene_done(Stage::Compose, "Scene", i + 1, total);
    }

    let list_file = ctx.layout.concat_list();
    let final_video = ctx.layout.final_video();
    match plan_concat(&job.transitions, total) {
        ConcatPlan::WithGaps(gaps) => {
            ctx.running(Stage::Compose, "Joining scenes with transitions");
            if let Err(e) = run_ffmpeg(&concat_gap_args(&composed, &gaps, &final_video)).await {
                tracing::warn!(run_id = %ctx.run_id, error = %e, "Gap join failed, falling back to plain join");
                ctx.running(Stage::Compose, "Transition join failed, falling back to plain join");
                plain_join(&composed, &list_file, &final_video).await?;
            }
        }
        ConcatPlan::Simple => {
            ctx.running(Stage::Compose, "Joining scenes");
            plain_join(&composed, &list_file, &final_video).await?;
        }
    }

    remove_intermediates(composed.iter().chain(std::iter::once(&list_file))).await;

    ctx.emit(ProgressEvent::done(Stage::Compose, "Final video composed"));
    tracing::info!(run_id = %ctx.run_id, output = %final_video.display(), "Compose stage finished");
    Ok(final_video)
}

async fn plain_join(inputs: &[PathBuf], list_file: &Path, output: &Path) -> Result<(), PipelineError> {
    tokio::fs::write(list_file, concat_list(inputs)).await?;
    run_ffmpeg(&concat_simple_args(list_file, output)).await?;
    Ok(())
}

async fn remove_intermediates<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove intermediate file"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
