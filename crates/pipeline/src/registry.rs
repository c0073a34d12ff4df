//! In-memory table of live runs.
//!
//! The registry is the authoritative state for every run: progress events
//! are advisory, the fields stored here are not. All access goes through
//! one `RwLock`, and stage admission is a single write-locked
//! check-and-set so two advance calls can never both start a worker.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use reel_core::error::CoreError;
use reel_core::script::Script;
use reel_core::stage::Stage;
use reel_core::types::{RunId, Timestamp};
use reel_core::voice::VoiceSettings;
use reel_store::RunLayout;
use serde::Serialize;
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// How the most recent stage invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Ready { stage: Stage },
    Failed { stage: Stage, detail: String },
    Complete { video_url: String },
}

/// One end-to-end pipeline execution.
///
/// Artifact lists are `None` until their stage first succeeds; when present
/// they always hold one path per scene, in scene order.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    pub created_at: Timestamp,
    pub theme: String,
    pub mock: bool,
    pub voice_id: String,
    pub script: Script,
    pub layout: RunLayout,
    pub images: Option<Vec<PathBuf>>,
    pub videos: Option<Vec<PathBuf>>,
    pub voices: Option<Vec<PathBuf>>,
    pub voice_settings: VoiceSettings,
    pub final_video: Option<PathBuf>,
    /// Set while a stage worker is running.
    pub active_stage: Option<Stage>,
    pub last_outcome: Option<StageOutcome>,
}

impl Run {
    pub fn new(
        id: RunId,
        created_at: Timestamp,
        theme: impl Into<String>,
        mock: bool,
        voice_id: impl Into<String>,
        script: Script,
        layout: RunLayout,
    ) -> Self {
        Self {
            id,
            created_at,
            theme: theme.into(),
            mock,
            voice_id: voice_id.into(),
            script,
            layout,
            images: None,
            videos: None,
            voices: None,
            voice_settings: VoiceSettings::default(),
            final_video: None,
            active_stage: None,
            last_outcome: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Shared handle to the run table.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<RunId, Run>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a run, replacing an idle run with the same id.
    ///
    /// Replacing a run that has a stage in flight is a conflict.
    pub async fn insert(&self, run: Run) -> Result<(), CoreError> {
        let mut runs = self.runs.write().await;
        if let Some(Run {
            active_stage: Some(stage),
            ..
        }) = runs.get(&run.id)
        {
            return Err(CoreError::Conflict(format!(
                "run {} is busy with the {stage} stage",
                run.id
            )));
        }
        runs.insert(run.id.clone(), run);
        Ok(())
    }

    /// Snapshot of a run.
    pub async fn get(&self, id: &RunId) -> Result<Run, CoreError> {
        self.runs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::run_not_found(id))
    }

    pub async fn contains(&self, id: &RunId) -> bool {
        self.runs.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    /// Mutate a run under the write lock.
    pub async fn update<T>(&self, id: &RunId, f: impl FnOnce(&mut Run) -> T) -> Result<T, CoreError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(id).ok_or_else(|| CoreError::run_not_found(id))?;
        Ok(f(run))
    }

    /// Admit a stage invocation.
    ///
    /// `admit` sees a copy of the run; it validates preconditions and may
    /// stage field changes. The copy replaces the stored run, with
    /// `active_stage` set, only if `admit` succeeds and no other stage is in
    /// flight. On any error the stored run is untouched.
    pub async fn begin_stage<T>(
        &self,
        id: &RunId,
        stage: Stage,
        admit: impl FnOnce(&mut Run) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut runs = self.runs.write().await;
        let current = runs.get(id).ok_or_else(|| CoreError::run_not_found(id))?;
        if let Some(active) = current.active_stage {
            return Err(CoreError::Conflict(format!(
                "run {id} is busy with the {active} stage"
            )));
        }

        let mut staged = current.clone();
        let value = admit(&mut staged)?;
        staged.active_stage = Some(stage);
        runs.insert(id.clone(), staged);
        Ok(value)
    }

    /// Commit a stage's result and clear `active_stage`.
    ///
    /// Returns the run as committed.
    pub async fn finish_stage(
        &self,
        id: &RunId,
        outcome: StageOutcome,
        commit: impl FnOnce(&mut Run),
    ) -> Result<Run, CoreError> {
        self.update(id, |run| {
            commit(run);
            run.active_stage = None;
            run.last_outcome = Some(outcome);
            run.clone()
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
