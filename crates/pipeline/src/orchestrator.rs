//! Control operations over runs.
//!
//! Every advance call follows the same path: a write-locked admission on
//! the registry (validation plus `active_stage`), a fresh progress channel,
//! then a spawned worker. A supervisor task awaits the worker, commits its
//! artifacts, clears `active_stage` and only then sends the terminal event,
//! so a client reacting to that event can advance again immediately.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use reel_core::error::CoreError;
use reel_core::script::Script;
use reel_core::stage::Stage;
use reel_core::types::{Clock, IdSource, RunId, SceneId, SystemClock, TimestampIdSource};
use reel_core::voice::default_voice_id;
use reel_events::{ArtifactRef, AttachError, ProgressEvent, ProgressHub, ProgressSender, ProgressStream};
use reel_providers::mock::mock_script;
use reel_providers::Providers;
use reel_store::{ArtifactKind, HistoryEntry, HistoryStore, RunLayout};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::regen::{merge, plan_regeneration, RegenPlan};
use crate::registry::{Run, RunRegistry, StageOutcome};
use crate::request::{
    Ack, ContinueRequest, FinalizeRequest, RegenerateRequest, RegenerateVoicesRequest,
    RunSnapshot, StartRequest, StartResponse, VideosRequest, VoicesRequest,
};
use crate::stages::compose::{compose_final, ComposeJob};
use crate::stages::images::{generate_images, ImageTask};
use crate::stages::videos::{generate_videos, regenerate_videos, VideoTask};
use crate::stages::voices::{generate_voices, VoiceJob};
use crate::stages::StageContext;

/// What a successful worker hands back for commit.
#[derive(Debug)]
enum StageSuccess {
    Images(Vec<PathBuf>),
    Videos(Vec<PathBuf>),
    Voices(Vec<PathBuf>),
    Final(PathBuf),
}

/// Entry point for every control operation.
///
/// Cheap to clone; clones share the registry, progress hub and history.
#[derive(Clone)]
pub struct Orchestrator {
    registry: RunRegistry,
    hub: ProgressHub,
    history: Arc<HistoryStore>,
    providers: Providers,
    config: Arc<PipelineConfig>,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, providers: Providers) -> Self {
        Self {
            registry: RunRegistry::new(),
            hub: ProgressHub::new(),
            history: Arc::new(HistoryStore::new(&config.output_root)),
            providers,
            config: Arc::new(config),
            ids: Arc::new(TimestampIdSource),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Script
    // -----------------------------------------------------------------------

    /// Create a run and write its script. Returns synchronously.
    pub async fn start(&self, req: StartRequest) -> Result<StartResponse, CoreError> {
        req.script.validate()?;

        let script = if req.mock {
            mock_script()
        } else {
            self.providers
                .script
                .generate_script(&req.script)
                .await
                .map_err(|e| CoreError::Internal(format!("script generation failed: {e}")))?
        };
        script.validate()?;

        let now = self.clock.now();
        let run_id = self.ids.next_id(now);
        let layout = RunLayout::new(&self.config.output_root, run_id.clone());
        layout.save_script(&script).await.map_err(CoreError::from)?;

        let voice_id = req
            .script
            .voice_id
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_voice_id().to_string());
        let run = Run::new(
            run_id.clone(),
            now,
            req.script.theme,
            req.mock,
            voice_id,
            script.clone(),
            layout,
        );
        self.registry.insert(run).await?;

        tracing::info!(
            run_id = %run_id,
            scenes = script.scene_count(),
            mock = req.mock,
            "Run created",
        );
        Ok(StartResponse { run_id, script })
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    /// Generate images for every scene, or only for `changed_scene_ids`.
    pub async fn advance_images(&self, id: &RunId, req: ContinueRequest) -> Result<Ack, CoreError> {
        let (plan, script, existing, edited) = self
            .registry
            .begin_stage(id, Stage::Image, |run| {
                let edited = req.script.is_some();
                if let Some(script) = req.script {
                    script.validate()?;
                    run.script = script;
                }
                let plan = plan_regeneration(
                    &run.script,
                    run.images.as_deref(),
                    req.changed_scene_ids.as_deref(),
                )?;
                Ok((plan, run.script.clone(), run.images.clone(), edited))
            })
            .await?;

        let tasks = plan
            .positions(script.scene_count())
            .into_iter()
            .map(|p| ImageTask::new(script.scenes[p].clone()))
            .collect();

        self.launch(id, Stage::Image, move |ctx| async move {
            if edited {
                ctx.layout.save_script(&script).await?;
            }
            let fresh = generate_images(&ctx, tasks).await?;
            Ok(StageSuccess::Images(apply_plan(&plan, existing, fresh)?))
        })
        .await
    }

    /// Regenerate selected images with per-scene instructions.
    pub async fn regenerate_images(&self, id: &RunId, req: RegenerateRequest) -> Result<Ack, CoreError> {
        let targets: Vec<SceneId> = req.scene_instructions.keys().copied().collect();
        let (plan, script, existing) = self
            .registry
            .begin_stage(id, Stage::Image, |run| {
                require(run.images.is_some(), "images have not been generated yet")?;
                require(!targets.is_empty(), "no scenes selected for regeneration")?;
                let plan = plan_regeneration(&run.script, run.images.as_deref(), Some(&targets))?;
                Ok((plan, run.script.clone(), run.images.clone()))
            })
            .await?;

        let tasks = plan
            .positions(script.scene_count())
            .into_iter()
            .map(|p| {
                let scene = script.scenes[p].clone();
                ImageTask {
                    instruction: req.scene_instructions.get(&scene.scene_id).cloned(),
                    scene,
                }
            })
            .collect();

        self.launch(id, Stage::Image, move |ctx| async move {
            let fresh = generate_images(&ctx, tasks).await?;
            Ok(StageSuccess::Images(apply_plan(&plan, existing, fresh)?))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Videos
    // -----------------------------------------------------------------------

    /// Generate clips, optionally rearranging the images over the scenes
    /// first.
    ///
    /// A reorder that moves any image invalidates every clip, so the whole
    /// stage runs regardless of `changed_scene_ids`.
    pub async fn advance_videos(&self, id: &RunId, req: VideosRequest) -> Result<Ack, CoreError> {
        let (plan, script, images, existing) = self
            .registry
            .begin_stage(id, Stage::Video, |run| {
                let Some(images) = run.images.as_ref() else {
                    return Err(validation("images have not been generated yet"));
                };
                require(
                    images.len() == run.script.scene_count(),
                    "image list does not match the script",
                )?;
                let plan = plan_regeneration(
                    &run.script,
                    run.videos.as_deref(),
                    req.changed_scene_ids.as_deref(),
                )?;
                let reordered = match &req.scene_order {
                    Some(order) => reorder_images(run, order)?,
                    None => false,
                };
                Ok((
                    if reordered { RegenPlan::Full } else { plan },
                    run.script.clone(),
                    run.images.clone().unwrap_or_default(),
                    run.videos.clone(),
                ))
            })
            .await?;

        let tasks = video_tasks(&script, &images, plan.positions(script.scene_count()), |_| None);

        self.launch(id, Stage::Video, move |ctx| async move {
            let fresh = match &plan {
                RegenPlan::Full => generate_videos(&ctx, tasks).await?,
                RegenPlan::Partial(_) => regenerate_videos(&ctx, tasks).await?,
            };
            Ok(StageSuccess::Videos(apply_plan(&plan, existing, fresh)?))
        })
        .await
    }

    /// Regenerate selected clips with per-scene instructions.
    pub async fn regenerate_videos(&self, id: &RunId, req: RegenerateRequest) -> Result<Ack, CoreError> {
        let targets: Vec<SceneId> = req.scene_instructions.keys().copied().collect();
        let (plan, script, images, existing) = self
            .registry
            .begin_stage(id, Stage::Video, |run| {
                require(run.videos.is_some(), "videos have not been generated yet")?;
                require(!targets.is_empty(), "no scenes selected for regeneration")?;
                let images = run
                    .images
                    .clone()
                    .filter(|list| list.len() == run.script.scene_count())
                    .ok_or_else(|| validation("images have not been generated yet"))?;
                let plan = plan_regeneration(&run.script, run.videos.as_deref(), Some(&targets))?;
                Ok((plan, run.script.clone(), images, run.videos.clone()))
            })
            .await?;

        let instructions = req.scene_instructions;
        let tasks = video_tasks(&script, &images, plan.positions(script.scene_count()), |id| {
            instructions.get(&id).cloned()
        });

        self.launch(id, Stage::Video, move |ctx| async move {
            let fresh = regenerate_videos(&ctx, tasks).await?;
            Ok(StageSuccess::Videos(apply_plan(&plan, existing, fresh)?))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Voices
    // -----------------------------------------------------------------------

    /// Record narration for every scene, or only for `changed_scene_ids`.
    pub async fn advance_voices(&self, id: &RunId, req: VoicesRequest) -> Result<Ack, CoreError> {
        let (plan, script, existing, job) = self
            .registry
            .begin_stage(id, Stage::Voice, |run| {
                require(has_every_scene(run, &run.videos), "videos have not been generated yet")?;
                let plan = plan_regeneration(
                    &run.script,
                    run.voices.as_deref(),
                    req.changed_scene_ids.as_deref(),
                )?;
                run.voice_settings = run.voice_settings.with_overrides(req.speed, req.volume);
                let job = VoiceJob {
                    voice_id: run.voice_id.clone(),
                    settings: run.voice_settings,
                };
                Ok((plan, run.script.clone(), run.voices.clone(), job))
            })
            .await?;

        let scenes = plan
            .positions(script.scene_count())
            .into_iter()
            .map(|p| script.scenes[p].clone())
            .collect();

        self.launch(id, Stage::Voice, move |ctx| async move {
            let fresh = generate_voices(&ctx, &job, scenes).await?;
            Ok(StageSuccess::Voices(apply_plan(&plan, existing, fresh)?))
        })
        .await
    }

    /// Apply narration overrides, persist the script and re-record every
    /// scene.
    pub async fn regenerate_voices(
        &self,
        id: &RunId,
        req: RegenerateVoicesRequest,
    ) -> Result<Ack, CoreError> {
        let (script, job) = self
            .registry
            .begin_stage(id, Stage::Voice, |run| {
                require(has_every_scene(run, &run.videos), "videos have not been generated yet")?;
                run.script.apply_overrides(&req.texts, &req.emotions)?;
                run.voice_settings = run.voice_settings.with_overrides(req.speed, req.volume);
                let job = VoiceJob {
                    voice_id: run.voice_id.clone(),
                    settings: run.voice_settings,
                };
                Ok((run.script.clone(), job))
            })
            .await?;

        self.launch(id, Stage::Voice, move |ctx| async move {
            ctx.layout.save_script(&script).await?;
            let paths = generate_voices(&ctx, &job, script.scenes).await?;
            Ok(StageSuccess::Voices(paths))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Compose
    // -----------------------------------------------------------------------

    /// Compose the final video.
    pub async fn finalize(&self, id: &RunId, req: FinalizeRequest) -> Result<Ack, CoreError> {
        let caption = req.caption.unwrap_or_default();
        caption.validate()?;

        let job = self
            .registry
            .begin_stage(id, Stage::Compose, |run| {
                let n = run.script.scene_count();
                let videos = run
                    .videos
                    .clone()
                    .filter(|list| list.len() == n)
                    .ok_or_else(|| validation("videos have not been generated yet"))?;
                let voices = run
                    .voices
                    .clone()
                    .filter(|list| list.len() == n)
                    .ok_or_else(|| validation("voices have not been generated yet"))?;
                Ok(ComposeJob {
                    videos,
                    voices,
                    captions: run.script.scenes.iter().map(|s| s.text.clone()).collect(),
                    transitions: req.transitions,
                    caption,
                })
            })
            .await?;

        self.launch(id, Stage::Compose, move |ctx| async move {
            Ok(StageSuccess::Final(compose_final(&ctx, job).await?))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Progress / inspection
    // -----------------------------------------------------------------------

    /// Attach the single consumer of a run's progress channel.
    pub async fn subscribe(&self, id: &RunId) -> Result<ProgressStream, CoreError> {
        if !self.registry.contains(id).await {
            return Err(CoreError::run_not_found(id));
        }
        self.hub
            .attach(id, self.config.progress_keepalive)
            .map_err(|e| match e {
                AttachError::NotOpen(id) => CoreError::NotFound {
                    entity: "progress stream",
                    id: id.to_string(),
                },
                busy @ AttachError::Busy(_) => CoreError::Conflict(busy.to_string()),
            })
    }

    pub async fn snapshot(&self, id: &RunId) -> Result<RunSnapshot, CoreError> {
        let run = self.registry.get(id).await?;
        Ok(snapshot_of(&run, Some(self.clock.now().timestamp_millis())))
    }

    /// Rebuild a run in the registry from its history entry and the files
    /// still on disk.
    pub async fn restore(&self, id: &RunId) -> Result<RunSnapshot, CoreError> {
        let entry = self.history.get(id).await.map_err(CoreError::from)?;
        let layout = RunLayout::new(&self.config.output_root, id.clone());
        let dir = layout.dir();
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(CoreError::Validation(format!(
                "output directory {} no longer exists",
                dir.display()
            )));
        }

        let script = entry.script;
        let mut run = Run::new(
            id.clone(),
            entry.created_at,
            entry.theme,
            entry.mock,
            entry
                .voice_id
                .unwrap_or_else(|| default_voice_id().to_string()),
            script.clone(),
            layout.clone(),
        );
        run.voice_settings = entry.voice_settings;
        run.images = layout.existing(ArtifactKind::Image, &script).await;
        run.videos = layout.existing(ArtifactKind::Video, &script).await;
        run.voices = layout.existing(ArtifactKind::Voice, &script).await;
        let final_video = layout.final_video();
        if tokio::fs::try_exists(&final_video).await.unwrap_or(false) {
            run.final_video = Some(final_video);
        }

        let snapshot = snapshot_of(&run, None);
        self.registry.insert(run).await?;
        tracing::info!(
            run_id = %id,
            images = snapshot.images.is_some(),
            videos = snapshot.videos.is_some(),
            voices = snapshot.voices.is_some(),
            "Run restored from history",
        );
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Worker supervision
    // -----------------------------------------------------------------------

    /// Open a progress channel and spawn the admitted stage's worker.
    async fn launch<F, Fut>(&self, id: &RunId, stage: Stage, work: F) -> Result<Ack, CoreError>
    where
        F: FnOnce(StageContext) -> Fut,
        Fut: Future<Output = Result<StageSuccess, PipelineError>> + Send + 'static,
    {
        let run = self.registry.get(id).await?;
        let progress = self.hub.open(id);
        let ctx = StageContext {
            run_id: id.clone(),
            layout: run.layout,
            mock: run.mock,
            config: Arc::clone(&self.config),
            providers: self.providers.clone(),
            progress: progress.clone(),
            cancel: CancellationToken::new(),
        };

        tracing::info!(run_id = %id, %stage, mock = run.mock, "Stage admitted");
        let worker = tokio::spawn(work(ctx));

        let this = self.clone();
        let run_id = id.clone();
        tokio::spawn(async move {
            let result = worker.await;
            this.settle(&run_id, stage, result, &progress).await;
        });

        Ok(Ack {
            run_id: id.clone(),
            stage,
        })
    }

    /// Commit a finished worker and emit the terminal event.
    async fn settle(
        &self,
        id: &RunId,
        stage: Stage,
        result: Result<Result<StageSuccess, PipelineError>, JoinError>,
        progress: &ProgressSender,
    ) {
        let detail = match result {
            Ok(Ok(success)) => {
                if let Err(e) = self.commit(id, stage, success, progress).await {
                    tracing::error!(run_id = %id, %stage, error = %e, "Failed to commit stage");
                    progress.send(ProgressEvent::RunError {
                        detail: e.to_string(),
                    });
                }
                return;
            }
            Ok(Err(e)) => {
                tracing::error!(run_id = %id, %stage, error = %e, "Stage failed");
                e.to_string()
            }
            Err(e) => {
                tracing::error!(run_id = %id, %stage, error = %e, "Stage worker panicked");
                let detail = format!("{stage} worker crashed");
                self.mark_failed(id, stage, &detail).await;
                progress.send(ProgressEvent::RunError { detail });
                return;
            }
        };

        self.mark_failed(id, stage, &detail).await;
        progress.send(ProgressEvent::error(stage, detail));
    }

    async fn mark_failed(&self, id: &RunId, stage: Stage, detail: &str) {
        let outcome = StageOutcome::Failed {
            stage,
            detail: detail.to_string(),
        };
        if let Err(e) = self.registry.finish_stage(id, outcome, |_| {}).await {
            tracing::error!(run_id = %id, error = %e, "Failed to record stage failure");
        }
    }

    async fn commit(
        &self,
        id: &RunId,
        stage: Stage,
        success: StageSuccess,
        progress: &ProgressSender,
    ) -> Result<(), CoreError> {
        let version = Some(self.clock.now().timestamp_millis());

        if let StageSuccess::Final(path) = success {
            let layout = self.registry.get(id).await?.layout;
            let video_url = layout
                .url_for(&path, version)
                .ok_or_else(|| CoreError::Internal("final video outside output root".into()))?;
            let run = self
                .registry
                .finish_stage(
                    id,
                    StageOutcome::Complete {
                        video_url: video_url.clone(),
                    },
                    |run| run.final_video = Some(path),
                )
                .await?;
            if let Err(e) = self.history.upsert(history_entry(&run)).await {
                tracing::error!(run_id = %id, error = %e, "Failed to record run in history");
            }
            tracing::info!(run_id = %id, %video_url, "Run complete");
            progress.send(ProgressEvent::RunComplete { video_url });
            return Ok(());
        }

        let run = self
            .registry
            .finish_stage(id, StageOutcome::Ready { stage }, |run| match success {
                StageSuccess::Images(list) => run.images = Some(list),
                StageSuccess::Videos(list) => run.videos = Some(list),
                StageSuccess::Voices(list) => run.voices = Some(list),
                StageSuccess::Final(_) => {}
            })
            .await?;

        let artifacts = match stage {
            Stage::Image => artifacts(&run, run.images.as_deref(), false, version),
            Stage::Video => artifacts(&run, run.videos.as_deref(), false, version),
            Stage::Voice => artifacts(&run, run.voices.as_deref(), true, version),
            Stage::Script | Stage::Compose => None,
        }
        .unwrap_or_default();

        tracing::info!(run_id = %id, %stage, count = artifacts.len(), "Stage ready");
        progress.send(ProgressEvent::StageReady { stage, artifacts });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validation(msg: &str) -> CoreError {
    CoreError::Validation(msg.to_string())
}

fn require(condition: bool, msg: &str) -> Result<(), CoreError> {
    if condition {
        Ok(())
    } else {
        Err(validation(msg))
    }
}

fn apply_plan(
    plan: &RegenPlan,
    existing: Option<Vec<PathBuf>>,
    fresh: Vec<PathBuf>,
) -> Result<Vec<PathBuf>, PipelineError> {
    match (plan, existing) {
        (RegenPlan::Full, _) => Ok(fresh),
        (RegenPlan::Partial(positions), Some(existing)) => Ok(merge(&existing, positions, fresh)?),
        (RegenPlan::Partial(_), None) => Err(PipelineError::Internal(
            "partial regeneration without an existing list".into(),
        )),
    }
}

/// Whether `list` holds one artifact per scene of the run's script.
fn has_every_scene(run: &Run, list: &Option<Vec<PathBuf>>) -> bool {
    list.as_ref()
        .is_some_and(|l| l.len() == run.script.scene_count())
}

/// Give position `i` the image of scene `order[i]`.
///
/// The script and the other artifact lists keep their order. Returns
/// whether any image moved.
fn reorder_images(run: &mut Run, order: &[SceneId]) -> Result<bool, CoreError> {
    let mut sorted = order.to_vec();
    sorted.sort_unstable();
    let mut ids = run.script.scene_ids();
    ids.sort_unstable();
    if sorted != ids {
        return Err(CoreError::Validation(format!(
            "scene_order {order:?} is not a permutation of the script's scene ids"
        )));
    }

    let positions: Vec<usize> = order
        .iter()
        .filter_map(|id| run.script.position_of(*id))
        .collect();
    if positions.iter().enumerate().all(|(i, p)| i == *p) {
        return Ok(false);
    }

    if let Some(images) = run.images.as_mut() {
        *images = positions.iter().map(|&p| images[p].clone()).collect();
    }
    Ok(true)
}

fn video_tasks(
    script: &Script,
    images: &[PathBuf],
    positions: Vec<usize>,
    instruction: impl Fn(SceneId) -> Option<String>,
) -> Vec<VideoTask> {
    positions
        .into_iter()
        .map(|p| {
            let scene = script.scenes[p].clone();
            VideoTask {
                image: images[p].clone(),
                instruction: instruction(scene.scene_id),
                scene,
            }
        })
        .collect()
}

/// URL-addressed artifacts, paired with the scenes at the same positions.
fn artifacts(
    run: &Run,
    paths: Option<&[PathBuf]>,
    with_text: bool,
    version: Option<i64>,
) -> Option<Vec<ArtifactRef>> {
    let paths = paths?;
    Some(
        run.script
            .scenes
            .iter()
            .zip(paths)
            .map(|(scene, path)| ArtifactRef {
                scene_id: scene.scene_id,
                url: run.layout.url_for(path, version).unwrap_or_default(),
                text: with_text.then(|| scene.text.clone()),
                emotion: if with_text { scene.emotion.clone() } else { None },
            })
            .collect(),
    )
}

fn snapshot_of(run: &Run, version: Option<i64>) -> RunSnapshot {
    RunSnapshot {
        run_id: run.id.clone(),
        created_at: run.created_at,
        theme: run.theme.clone(),
        mock: run.mock,
        voice_id: run.voice_id.clone(),
        voice_settings: run.voice_settings,
        script: run.script.clone(),
        images: artifacts(run, run.images.as_deref(), false, version),
        videos: artifacts(run, run.videos.as_deref(), false, version),
        voices: artifacts(run, run.voices.as_deref(), true, version),
        video_url: run
            .final_video
            .as_deref()
            .and_then(|p| run.layout.url_for(p, version)),
        active_stage: run.active_stage,
        last_outcome: run.last_outcome.clone(),
    }
}

fn history_entry(run: &Run) -> HistoryEntry {
    HistoryEntry {
        run_id: run.id.clone(),
        created_at: run.created_at,
        theme: run.theme.clone(),
        mock: run.mock,
        script: run.script.clone(),
        images: artifacts(run, run.images.as_deref(), false, None).unwrap_or_default(),
        videos: artifacts(run, run.videos.as_deref(), false, None).unwrap_or_default(),
        voices: artifacts(run, run.voices.as_deref(), true, None).unwrap_or_default(),
        video_url: run
            .final_video
            .as_deref()
            .and_then(|p| run.layout.url_for(p, None)),
        output_dir: run.layout.dir(),
        voice_id: Some(run.voice_id.clone()),
        voice_settings: run.voice_settings,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::tests::{Plan, ScriptedVideo};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use reel_core::script::{Scene, ScriptRequest};
    use reel_core::types::{FixedClock, FixedIdSource};
    use reel_events::StreamItem;
    use reel_providers::{
        ImageProvider, ProviderError, ScriptProvider, VoiceProvider, VoiceRequest,
    };
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Records every prompt; a gated instance waits for a permit per image.
    #[derive(Default)]
    struct RecordingImages {
        gate: Option<Semaphore>,
        prompts: Mutex<Vec<(SceneId, String)>>,
    }

    impl RecordingImages {
        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Default::default()
            }
        }

        fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        fn take(&self) -> Vec<(SceneId, String)> {
            std::mem::take(&mut *self.prompts.lock().unwrap())
        }
    }

    #[async_trait]
    impl ImageProvider for RecordingImages {
        async fn generate_image(
            &self,
            scene: &Scene,
            prompt: &str,
            output: &Path,
        ) -> Result<(), ProviderError> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.prompts
                .lock()
                .unwrap()
                .push((scene.scene_id, prompt.to_string()));
            std::fs::write(output, b"png").map_err(ProviderError::from)
        }
    }

    /// Records narration text, then refuses.
    #[derive(Default)]
    struct RefusingVoice {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VoiceProvider for RefusingVoice {
        async fn synthesize(&self, request: VoiceRequest<'_>, _output: &Path) -> Result<(), ProviderError> {
            self.texts.lock().unwrap().push(request.text.to_string());
            Err(ProviderError::Fatal("voice quota exhausted".into()))
        }
    }

    struct CannedScripts;

    #[async_trait]
    impl ScriptProvider for CannedScripts {
        async fn generate_script(&self, _request: &ScriptRequest) -> Result<Script, ProviderError> {
            Ok(mock_script())
        }
    }

    fn live(images: Arc<RecordingImages>) -> Providers {
        Providers {
            script: Arc::new(CannedScripts),
            image: images,
            ..Providers::unconfigured()
        }
    }

    fn all_done_first_poll() -> ScriptedVideo {
        ScriptedVideo::new((1..=5).map(|id| (id, Plan::DoneAfter(1))))
    }

    fn frozen_at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn orchestrator_with(root: &Path, providers: Providers) -> Orchestrator {
        let config = PipelineConfig {
            output_root: root.to_path_buf(),
            frame_width: 8,
            frame_height: 16,
            ..Default::default()
        };
        let ids = FixedIdSource::new([
            RunId::parse("run_a").unwrap(),
            RunId::parse("run_b").unwrap(),
        ]);
        Orchestrator::new(config, providers)
            .with_id_source(Arc::new(ids))
            .with_clock(Arc::new(FixedClock(frozen_at())))
    }

    fn orchestrator(root: &Path) -> Orchestrator {
        orchestrator_with(root, Providers::unconfigured())
    }

    /// A live run whose images and clips are already on record.
    fn seeded_run(orch: &Orchestrator, name: &str) -> Run {
        let id = RunId::parse(name).unwrap();
        let layout = RunLayout::new(&orch.config().output_root, id.clone());
        std::fs::create_dir_all(layout.dir()).unwrap();
        let mut run = Run::new(id, frozen_at(), "t", false, "v", mock_script(), layout.clone());
        run.images = Some((1..=5).map(|i| layout.image(i)).collect());
        run.videos = Some((1..=5).map(|i| layout.video(i)).collect());
        run
    }

    async fn terminal(orch: &Orchestrator, id: &RunId) -> ProgressEvent {
        let mut stream = orch.subscribe(id).await.unwrap();
        let mut last = None;
        while let Some(item) = stream.next().await {
            if let StreamItem::Event(event) = item {
                last = Some(event);
            }
        }
        last.unwrap()
    }

    #[tokio::test]
    async fn mock_start_writes_script_under_injected_id() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());

        let started = orch.start(StartRequest::new("anything").mock()).await.unwrap();

        assert_eq!(started.run_id.as_str(), "run_a");
        assert_eq!(started.script.scene_count(), 5);
        assert!(dir.path().join("run_a").join("script.json").exists());
    }

    #[tokio::test]
    async fn real_start_without_provider_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        assert_matches!(
            orch.start(StartRequest::new("theme")).await,
            Err(CoreError::Internal(_))
        );
        assert_eq!(orch.registry().len().await, 0);
    }

    #[tokio::test]
    async fn mock_image_stage_ends_with_ready_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let id = orch.start(StartRequest::new("t").mock()).await.unwrap().run_id;

        let ack = orch.advance_images(&id, ContinueRequest::default()).await.unwrap();
        assert_eq!(ack.stage, Stage::Image);

        assert_matches!(terminal(&orch, &id).await, ProgressEvent::StageReady { stage: Stage::Image, artifacts } => {
            assert_eq!(artifacts.len(), 5);
            assert_eq!(artifacts[0].url, "/output/run_a/scene_1.png?t=1735689600000");
        });
        let run = orch.registry().get(&id).await.unwrap();
        assert_eq!(run.active_stage, None);
        assert_eq!(run.images.map(|l| l.len()), Some(5));
        assert_eq!(run.last_outcome, Some(StageOutcome::Ready { stage: Stage::Image }));
    }

    #[tokio::test]
    async fn unknown_changed_scene_fails_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let id = orch.start(StartRequest::new("t").mock()).await.unwrap().run_id;
        orch.advance_images(&id, ContinueRequest::default()).await.unwrap();
        terminal(&orch, &id).await;
        let before = orch.registry().get(&id).await.unwrap().images;

        let err = orch
            .advance_images(
                &id,
                ContinueRequest {
                    script: None,
                    changed_scene_ids: Some(vec![2, 42]),
                },
            )
            .await
            .unwrap_err();

        assert_matches!(err, CoreError::Validation(_));
        let run = orch.registry().get(&id).await.unwrap();
        assert_eq!(run.images, before);
        assert_eq!(run.active_stage, None);
    }

    #[tokio::test]
    async fn image_edits_only_touch_targeted_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let images = Arc::new(RecordingImages::default());
        let orch = orchestrator_with(dir.path(), live(images.clone()));
        let id = orch.start(StartRequest::new("t")).await.unwrap().run_id;
        orch.advance_images(&id, ContinueRequest::default()).await.unwrap();
        terminal(&orch, &id).await;
        assert_eq!(images.take().len(), 5);
        let before = orch.registry().get(&id).await.unwrap().images.unwrap();

        orch.advance_images(
            &id,
            ContinueRequest {
                script: None,
                changed_scene_ids: Some(vec![4, 2]),
            },
        )
        .await
        .unwrap();
        assert_matches!(terminal(&orch, &id).await, ProgressEvent::StageReady { .. });
        let mut ids: Vec<SceneId> = images.take().into_iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![2, 4]);

        let mut req = RegenerateRequest::default();
        req.scene_instructions.insert(3, "brighter".into());
        orch.regenerate_images(&id, req).await.unwrap();
        assert_matches!(terminal(&orch, &id).await, ProgressEvent::StageReady { .. });

        let prompts = images.take();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, 3);
        assert!(prompts[0].1.ends_with(". Additional instructions: brighter"));
        assert_eq!(orch.registry().get(&id).await.unwrap().images.unwrap(), before);
    }

    #[tokio::test]
    async fn advance_while_active_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let images = Arc::new(RecordingImages::gated());
        let orch = orchestrator_with(dir.path(), live(images.clone()));
        let id = orch.start(StartRequest::new("t")).await.unwrap().run_id;

        orch.advance_images(&id, ContinueRequest::default()).await.unwrap();
        assert_matches!(
            orch.advance_images(&id, ContinueRequest::default()).await,
            Err(CoreError::Conflict(_))
        );
        assert_matches!(
            orch.advance_videos(&id, VideosRequest::default()).await,
            Err(CoreError::Conflict(_))
        );
        assert_eq!(
            orch.registry().get(&id).await.unwrap().active_stage,
            Some(Stage::Image)
        );

        images.release(5);
        assert_matches!(terminal(&orch, &id).await, ProgressEvent::StageReady { .. });
        assert_eq!(orch.registry().get(&id).await.unwrap().active_stage, None);
    }

    #[tokio::test]
    async fn regenerate_videos_starts_only_selected_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(all_done_first_poll());
        let orch = orchestrator_with(
            dir.path(),
            Providers {
                video: video.clone(),
                ..Providers::unconfigured()
            },
        );
        let run = seeded_run(&orch, "run_v");
        let (id, before) = (run.id.clone(), run.videos.clone());
        orch.registry().insert(run).await.unwrap();

        let mut req = RegenerateRequest::default();
        req.scene_instructions.insert(4, "slower pan".into());
        req.scene_instructions.insert(2, "zoom out".into());
        orch.regenerate_videos(&id, req).await.unwrap();
        assert_matches!(terminal(&orch, &id).await, ProgressEvent::StageReady { stage: Stage::Video, .. });

        let mut started = video.started.lock().unwrap().clone();
        started.sort_unstable();
        assert_eq!(started, vec![2, 4]);
        assert_eq!(orch.registry().get(&id).await.unwrap().videos, before);
    }

    #[tokio::test]
    async fn scene_order_moves_images_and_regenerates_every_clip() {
        let dir = tempfile::tempdir().unwrap();
        let video = Arc::new(all_done_first_poll());
        let orch = orchestrator_with(
            dir.path(),
            Providers {
                video: video.clone(),
                ..Providers::unconfigured()
            },
        );
        let run = seeded_run(&orch, "run_o");
        let (id, layout) = (run.id.clone(), run.layout.clone());
        orch.registry().insert(run).await.unwrap();

        orch.advance_videos(
            &id,
            VideosRequest {
                scene_order: Some(vec![2, 1, 3, 4, 5]),
                changed_scene_ids: Some(vec![4]),
            },
        )
        .await
        .unwrap();

        let run = orch.registry().get(&id).await.unwrap();
        assert_eq!(run.script.scene_ids(), vec![1, 2, 3, 4, 5]);
        assert_eq!(run.script.scenes[0].text, mock_script().scenes[0].text);
        let images = run.images.unwrap();
        assert_eq!(images[0], layout.image(2));
        assert_eq!(images[1], layout.image(1));
        assert_eq!(images[2], layout.image(3));

        assert_matches!(terminal(&orch, &id).await, ProgressEvent::StageReady { .. });
        let mut started = video.started.lock().unwrap().clone();
        started.sort_unstable();
        assert_eq!(started, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn changed_voice_scene_is_the_only_one_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let voice = Arc::new(RefusingVoice::default());
        let orch = orchestrator_with(
            dir.path(),
            Providers {
                voice: voice.clone(),
                ..Providers::unconfigured()
            },
        );
        let mut run = seeded_run(&orch, "run_n");
        run.voices = Some((1..=5).map(|i| run.layout.voice(i)).collect());
        let (id, before) = (run.id.clone(), run.voices.clone());
        orch.registry().insert(run).await.unwrap();

        orch.advance_voices(
            &id,
            VoicesRequest {
                changed_scene_ids: Some(vec![2]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_matches!(terminal(&orch, &id).await, ProgressEvent::StageError { stage: Stage::Voice, .. });

        let texts = voice.texts.lock().unwrap().clone();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].ends_with(&mock_script().scenes[1].text));
        assert_eq!(orch.registry().get(&id).await.unwrap().voices, before);
    }

    #[tokio::test]
    async fn voices_need_a_clip_for_every_scene() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let mut run = seeded_run(&orch, "run_s");
        if let Some(videos) = run.videos.as_mut() {
            videos.pop();
        }
        let id = run.id.clone();
        orch.registry().insert(run).await.unwrap();

        assert_matches!(
            orch.advance_voices(&id, VoicesRequest::default()).await,
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            orch.regenerate_voices(&id, RegenerateVoicesRequest::default()).await,
            Err(CoreError::Validation(_))
        );
        assert_eq!(orch.registry().get(&id).await.unwrap().active_stage, None);
    }

    #[tokio::test]
    async fn stage_preconditions_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let id = orch.start(StartRequest::new("t").mock()).await.unwrap().run_id;

        assert_matches!(
            orch.advance_videos(&id, VideosRequest::default()).await,
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            orch.advance_voices(&id, VoicesRequest::default()).await,
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            orch.finalize(&id, FinalizeRequest::default()).await,
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            orch.regenerate_images(&id, RegenerateRequest::default()).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn unknown_run_is_not_found_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let id = RunId::parse("nope").unwrap();

        assert_matches!(orch.snapshot(&id).await, Err(CoreError::NotFound { .. }));
        assert_matches!(orch.subscribe(&id).await, Err(CoreError::NotFound { .. }));
        assert_matches!(
            orch.advance_images(&id, ContinueRequest::default()).await,
            Err(CoreError::NotFound { .. })
        );
        assert_matches!(orch.restore(&id).await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn scene_order_must_be_a_permutation() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let id = orch.start(StartRequest::new("t").mock()).await.unwrap().run_id;
        orch.advance_images(&id, ContinueRequest::default()).await.unwrap();
        terminal(&orch, &id).await;

        let err = orch
            .advance_videos(
                &id,
                VideosRequest {
                    scene_order: Some(vec![1, 2, 3, 4, 4]),
                    changed_scene_ids: None,
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
        assert_eq!(orch.registry().get(&id).await.unwrap().script.scene_ids(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn reorder_moves_only_images() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let mut run = seeded_run(&orch, "r");
        let layout = run.layout.clone();
        run.voices = Some((1..=5).map(|i| layout.voice(i)).collect());
        let (videos, voices) = (run.videos.clone(), run.voices.clone());

        assert!(reorder_images(&mut run, &[3, 1, 2, 5, 4]).unwrap());

        assert_eq!(run.script, mock_script());
        let images = run.images.unwrap();
        assert_eq!(images[0], layout.image(3));
        assert_eq!(images[1], layout.image(1));
        assert_eq!(images[4], layout.image(4));
        assert_eq!(run.videos, videos);
        assert_eq!(run.voices, voices);
    }

    #[test]
    fn identity_order_is_not_a_reorder() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let mut run = seeded_run(&orch, "r");
        let images = run.images.clone();

        assert!(!reorder_images(&mut run, &[1, 2, 3, 4, 5]).unwrap());
        assert_eq!(run.images, images);
    }

    #[tokio::test]
    async fn restore_rebuilds_lists_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let id = orch.start(StartRequest::new("t").mock()).await.unwrap().run_id;
        orch.advance_images(&id, ContinueRequest::default()).await.unwrap();
        terminal(&orch, &id).await;

        let run = orch.registry().get(&id).await.unwrap();
        orch.history().upsert(history_entry(&run)).await.unwrap();
        // One clip on disk is not a complete list.
        std::fs::write(run.layout.video(1), b"clip").unwrap();

        let snapshot = orch.restore(&id).await.unwrap();
        assert!(snapshot.mock);
        assert_eq!(snapshot.images.map(|l| l.len()), Some(5));
        assert!(snapshot.videos.is_none());
        assert!(snapshot.voices.is_none());
    }

    #[tokio::test]
    async fn restore_without_directory_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let id = orch.start(StartRequest::new("t").mock()).await.unwrap().run_id;
        let run = orch.registry().get(&id).await.unwrap();
        orch.history().upsert(history_entry(&run)).await.unwrap();
        std::fs::remove_dir_all(run.layout.dir()).unwrap();

        assert_matches!(orch.restore(&id).await, Err(CoreError::Validation(_)));
    }
}
