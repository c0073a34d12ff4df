//! Background stage workers.
//!
//! Each worker receives a [`StageContext`] and returns the artifact paths
//! it produced. Workers report progress but never touch the run registry;
//! the orchestrator commits their results.

pub mod compose;
pub mod images;
pub mod videos;
pub mod voices;

use std::sync::Arc;

use reel_core::stage::Stage;
use reel_core::types::RunId;
use reel_events::{ProgressEvent, ProgressSender};
use reel_providers::Providers;
use reel_store::RunLayout;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;

/// Everything a stage worker needs, detached from the registry.
#[derive(Clone)]
pub struct StageContext {
    pub run_id: RunId,
    pub layout: RunLayout,
    pub mock: bool,
    pub config: Arc<PipelineConfig>,
    pub providers: Providers,
    pub progress: ProgressSender,
    pub cancel: CancellationToken,
}

impl StageContext {
    pub fn emit(&self, event: ProgressEvent) {
        self.progress.send(event);
    }

    pub fn running(&self, stage: Stage, detail: impl Into<String>) {
        self.emit(ProgressEvent::running(stage, detail));
    }

    /// Per-scene completion counter.
    pub fn scene_done(&self, stage: Stage, noun: &str, completed: usize, total: usize) {
        self.emit(ProgressEvent::running_with(
            stage,
            format!("{noun} {completed}/{total} ready"),
            completed,
            total,
        ));
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use reel_core::script::{Scene, Script};
    use reel_events::{ProgressHub, StreamItem};

    pub(crate) fn script(n: u32) -> Script {
        Script {
            title: "test".into(),
            scenes: (1..=n)
                .map(|id| Scene {
                    scene_id: id,
                    text: format!("line {id}"),
                    image_prompt: format!("a person at a desk, scene {id}"),
                    duration_sec: 5.0,
                    emotion: None,
                })
                .collect(),
        }
    }

    /// Context over a fresh hub channel, with small frames.
    pub(crate) fn context(root: &Path, mock: bool, providers: Providers) -> (StageContext, ProgressHub) {
        let hub = ProgressHub::new();
        let run_id = RunId::parse("test_run").unwrap();
        let progress = hub.open(&run_id);
        let config = PipelineConfig {
            output_root: root.to_path_buf(),
            frame_width: 8,
            frame_height: 16,
            ..Default::default()
        };
        let layout = RunLayout::new(root, run_id.clone());
        std::fs::create_dir_all(layout.dir()).unwrap();
        let ctx = StageContext {
            run_id,
            layout,
            mock,
            config: Arc::new(config),
            providers,
            progress,
            cancel: CancellationToken::new(),
        };
        (ctx, hub)
    }

    /// Every event produced before the context was dropped.
    pub(crate) async fn drain(hub: &ProgressHub, run_id: &RunId) -> Vec<ProgressEvent> {
        let mut stream = hub.attach(run_id, Duration::from_secs(3600)).unwrap();
        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            if let StreamItem::Event(event) = item {
                events.push(event);
            }
        }
        events
    }

    /// Completed counters carried by running events, in arrival order.
    pub(crate) fn counters(events: &[ProgressEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::StageRunning {
                    progress: Some(p), ..
                } => Some(p.completed),
                _ => None,
            })
            .collect()
    }
}
