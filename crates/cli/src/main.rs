//! One-shot end-to-end runner.
//!
//! Creates a run from a theme and drives it through every stage without
//! review pauses, logging progress as it arrives.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use reel_core::caption::CaptionSettings;
use reel_core::composition::Transition;
use reel_core::script::ScriptRequest;
use reel_core::types::RunId;
use reel_events::{ProgressEvent, StreamItem};
use reel_pipeline::{
    ContinueRequest, FinalizeRequest, Orchestrator, PipelineConfig, StartRequest, VideosRequest,
    VoicesRequest,
};
use reel_providers::Providers;
use reel_store::RunLayout;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "reel-cli")]
#[command(about = "Generate a short narrated video from a theme")]
#[command(version)]
struct Args {
    /// Theme the script is written about
    #[arg(long)]
    theme: String,

    /// Target video length in seconds
    #[arg(long, default_value_t = 45)]
    duration: u32,

    /// Use placeholders instead of generation providers
    #[arg(long)]
    mock: bool,

    /// Root directory for run output
    #[arg(long, env = "OUTPUT_DIR", default_value = "./output")]
    output_dir: PathBuf,

    /// Narration voice (defaults to the first catalogue voice)
    #[arg(long)]
    voice_id: Option<String>,

    /// Pause in seconds between consecutive scenes
    #[arg(long, default_value_t = 0.0)]
    gap: f64,

    /// Burn the narration text into each scene
    #[arg(long)]
    caption: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reel_cli=info,reel_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if args.gap < 0.0 {
        bail!("--gap must not be negative");
    }

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    let config = PipelineConfig {
        output_root: args.output_dir.clone(),
        ..PipelineConfig::default()
    };
    let orchestrator = Orchestrator::new(config, Providers::unconfigured());

    let mut script = ScriptRequest::new(&args.theme);
    script.duration_secs = args.duration;
    script.voice_id = args.voice_id.clone();
    let started = orchestrator
        .start(StartRequest {
            script,
            mock: args.mock,
        })
        .await?;
    let run_id = started.run_id;
    let scenes = started.script.scene_count();
    tracing::info!(
        run_id = %run_id,
        title = %started.script.title,
        scenes,
        "Script ready",
    );

    orchestrator
        .advance_images(&run_id, ContinueRequest::default())
        .await?;
    follow(&orchestrator, &run_id).await?;

    orchestrator
        .advance_videos(&run_id, VideosRequest::default())
        .await?;
    follow(&orchestrator, &run_id).await?;

    orchestrator
        .advance_voices(&run_id, VoicesRequest::default())
        .await?;
    follow(&orchestrator, &run_id).await?;

    let finalize = FinalizeRequest {
        transitions: vec![Transition { gap_secs: args.gap }; scenes],
        caption: Some(CaptionSettings {
            enabled: args.caption,
            ..CaptionSettings::default()
        }),
    };
    orchestrator.finalize(&run_id, finalize).await?;
    follow(&orchestrator, &run_id).await?;

    let snapshot = orchestrator.snapshot(&run_id).await?;
    let layout = RunLayout::new(&args.output_dir, run_id.clone());
    println!("{}", layout.final_video().display());
    tracing::info!(
        run_id = %run_id,
        video_url = snapshot.video_url.as_deref().unwrap_or_default(),
        "Run finished",
    );
    Ok(())
}

/// Log the current stage's progress until its terminal event.
async fn follow(orchestrator: &Orchestrator, run_id: &RunId) -> anyhow::Result<()> {
    let mut progress = orchestrator.subscribe(run_id).await?;
    while let Some(item) = progress.next().await {
        let event = match item {
            StreamItem::Event(event) => event,
            StreamItem::KeepAlive => continue,
        };
        match event {
            ProgressEvent::StageRunning {
                stage,
                detail,
                progress: Some(p),
            } => tracing::info!(%stage, completed = p.completed, total = p.total, "{detail}"),
            ProgressEvent::StageRunning { stage, detail, .. }
            | ProgressEvent::StageDone { stage, detail } => tracing::info!(%stage, "{detail}"),
            ProgressEvent::StageReady { stage, artifacts } => {
                tracing::info!(%stage, count = artifacts.len(), "Stage ready");
                return Ok(());
            }
            ProgressEvent::RunComplete { video_url } => {
                tracing::info!(%video_url, "Final video composed");
                return Ok(());
            }
            ProgressEvent::StageError { stage, detail } => bail!("{stage} stage failed: {detail}"),
            ProgressEvent::RunError { detail } => bail!("run failed: {detail}"),
        }
    }
    bail!("progress stream for {run_id} ended without a result")
}
