//! Image stage: one still per scene.

use std::path::PathBuf;

use reel_core::prompt::{prompt_for_attempt, with_instruction};
use reel_core::script::Scene;
use reel_core::stage::Stage;
use reel_events::ProgressEvent;
use reel_providers::placeholder::write_placeholder_image;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::fanout::FanOut;
use crate::retry::with_retry;
use crate::stages::StageContext;

/// One image to produce.
#[derive(Debug, Clone)]
pub struct ImageTask {
    pub scene: Scene,
    /// Free-text addition to the scene's prompt.
    pub instruction: Option<String>,
}

impl ImageTask {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            instruction: None,
        }
    }
}

/// Generate every task's image, returning paths in task order.
pub async fn generate_images(
    ctx: &StageContext,
    tasks: Vec<ImageTask>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let total = tasks.len();
    ctx.running(Stage::Image, format!("Generating {total} images"));
    tracing::info!(run_id = %ctx.run_id, total, mock = ctx.mock, "Image stage started");

    let fan = FanOut::new(ctx.config.image_concurrency).with_parent(&ctx.cancel);
    let paths = fan
        .run(
            tasks,
            |_, task, cancel| async move { generate_one(ctx, task, cancel).await },
            |completed, total| ctx.scene_done(Stage::Image, "Image", completed, total),
        )
        .await?;

    ctx.emit(ProgressEvent::done(Stage::Image, format!("{total} images generated")));
    Ok(paths)
}

async fn generate_one(
    ctx: &StageContext,
    task: ImageTask,
    cancel: CancellationToken,
) -> Result<PathBuf, PipelineError> {
    let scene_id = task.scene.scene_id;
    let output = ctx.layout.image(scene_id);

    if ctx.mock {
        write_placeholder_image(
            scene_id,
            ctx.config.frame_width,
            ctx.config.frame_height,
            &output,
        )
        .await?;
        return Ok(output);
    }

    let base = with_instruction(&task.scene.image_prompt, task.instruction.as_deref());
    let provider = ctx.providers.image.as_ref();
    let scene = &task.scene;
    let target = &output;
    with_retry(&ctx.config.image_retry, &cancel, scene_id, |attempt| {
        let prompt = prompt_for_attempt(&base, attempt);
        async move { provider.generate_image(scene, &prompt, target).await }
    })
    .await
    .map_err(|e| PipelineError::provider(scene_id, e))?;

    tracing::debug!(run_id = %ctx.run_id, scene_id, "Image generated");
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
