//! Voice stage: narration per scene, fitted to the scene's duration.

use std::path::{Path, PathBuf};

use reel_core::composition::tempo_args;
use reel_core::ffmpeg::{probe_duration, run_ffmpeg};
use reel_core::script::Scene;
use reel_core::stage::Stage;
use reel_core::tempo::plan_tempo;
use reel_core::voice::{narration_input, VoiceSettings};
use reel_events::ProgressEvent;
use reel_providers::placeholder::write_placeholder_voice;
use reel_providers::VoiceRequest;

use crate::error::PipelineError;
use crate::fanout::FanOut;
use crate::stages::StageContext;

/// Narration parameters shared by every scene of one invocation.
#[derive(Debug, Clone)]
pub struct VoiceJob {
    pub voice_id: String,
    pub settings: VoiceSettings,
}

/// Record narration for `scenes`, returning paths in scene order.
pub async fn generate_voices(
    ctx: &StageContext,
    job: &VoiceJob,
    scenes: Vec<Scene>,
) -> Result<Vec<PathBuf>, PipelineError> {
    let total = scenes.len();
    let settings = job.settings.clamped();
    ctx.running(Stage::Voice, format!("Recording {total} narrations"));
    tracing::info!(
        run_id = %ctx.run_id,
        total,
        voice_id = %job.voice_id,
        speed = settings.speed,
        volume = settings.volume,
        mock = ctx.mock,
        "Voice stage started",
    );

    let fan = FanOut::new(ctx.config.voice_concurrency).with_parent(&ctx.cancel);
    let paths = fan
        .run(
            scenes,
            |_, scene, _| async move {
                if ctx.mock {
                    let output = ctx.layout.voice(scene.scene_id);
                    write_placeholder_voice(scene.duration_sec, &output).await?;
                    return Ok(output);
                }
                record_and_fit(ctx, &job.voice_id, settings, &scene).await
            },
            |completed, total| ctx.scene_done(Stage::Voice, "Narration", completed, total),
        )
        .await?;

    ctx.emit(ProgressEvent::done(Stage::Voice, format!("{total} narrations recorded")));
    Ok(paths)
}

async fn record_and_fit(
    ctx: &StageContext,
    voice_id: &str,
    settings: VoiceSettings,
    scene: &Scene,
) -> Result<PathBuf, PipelineError> {
    let scene_id = scene.scene_id;
    let raw = ctx.layout.raw_voice(scene_id);
    let output = ctx.layout.voice(scene_id);
    let text = narration_input(scene);

    ctx.providers
        .voice
        .synthesize(
            VoiceRequest {
                text: &text,
                voice_id,
                settings,
            },
            &raw,
        )
        .await
        .map_err(|e| PipelineError::provider(scene_id, e))?;

    fit_to_duration(&raw, scene.duration_sec, &output).await?;
    tracing::debug!(run_id = %ctx.run_id, scene_id, "Narration recorded");
    Ok(output)
}

/// Compress `raw` into `output` when it runs longer than `target` seconds.
///
/// A recording that already fits is moved into place unchanged.
async fn fit_to_duration(raw: &Path, target: f64, output: &Path) -> Result<(), PipelineError> {
    let current = probe_duration(raw).await?;
    match plan_tempo(current, target) {
        None => {
            tokio::fs::rename(raw, output).await?;
        }
        Some(plan) => {
            tracing::debug!(
                current,
                target,
                ratio = plan.combined_ratio(),
                steps = plan.steps.len(),
                "Fitting narration tempo",
            );
            run_ffmpeg(&tempo_args(raw, &plan.filter(), output)).await?;
            tokio::fs::remove_file(raw).await?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{context, counters, drain, script};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use reel_providers::{ProviderError, Providers, VoiceProvider};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingVoice {
        requests: Mutex<Vec<(String, String, VoiceSettings)>>,
    }

    #[async_trait]
    impl VoiceProvider for RecordingVoice {
        async fn synthesize(&self, request: VoiceRequest<'_>, _output: &Path) -> Result<(), ProviderError> {
            self.requests.lock().unwrap().push((
                request.text.to_string(),
                request.voice_id.to_string(),
                request.settings,
            ));
            Err(ProviderError::Fatal("stop before probing".into()))
        }
    }

    #[tokio::test]
    async fn mock_voices_match_scene_durations() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, hub) = context(dir.path(), true, Providers::unconfigured());
        let run_id = ctx.run_id.clone();
        let job = VoiceJob {
            voice_id: "voice-a".into(),
            settings: VoiceSettings::default(),
        };

        let paths = generate_voices(&ctx, &job, script(2).scenes).await.unwrap();
        drop(ctx);

        assert_eq!(paths.len(), 2);
        for path in &paths {
            let reader = hound::WavReader::open(path).unwrap();
            let secs = reader.duration() as f64 / reader.spec().sample_rate as f64;
            assert!((secs - 5.0).abs() < 1e-3);
        }
        let events = drain(&hub, &run_id).await;
        assert_eq!(counters(&events), vec![1, 2]);
    }

    #[tokio::test]
    async fn provider_gets_emotion_prefix_and_clamped_settings() {
        let dir = tempfile::tempdir().unwrap();
        let voice = Arc::new(RecordingVoice::default());
        let providers = Providers {
            voice: voice.clone(),
            ..Providers::unconfigured()
        };
        let (ctx, _hub) = context(dir.path(), false, providers);
        let mut scenes = script(1).scenes;
        scenes[0].emotion = Some("calm".into());
        let job = VoiceJob {
            voice_id: "voice-b".into(),
            settings: VoiceSettings {
                speed: 5.0,
                volume: -50.0,
            },
        };

        let err = generate_voices(&ctx, &job, scenes).await.unwrap_err();
        assert_matches!(err, PipelineError::Provider { scene_id: 1, .. });

        let requests = voice.requests.lock().unwrap();
        let (text, voice_id, settings) = &requests[0];
        assert_eq!(text, "(calm) line 1");
        assert_eq!(voice_id, "voice-b");
        assert_eq!(settings.speed, 2.0);
        assert_eq!(settings.volume, -20.0);
    }
}
