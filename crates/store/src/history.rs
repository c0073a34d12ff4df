//! Index of finalized runs.
//!
//! A single `history.json` in the output root holds every entry, newest
//! first. Entries are only ever removed by an explicit delete.

use std::path::{Path, PathBuf};

use reel_core::script::Script;
use reel_core::types::{RunId, Timestamp};
use reel_core::voice::VoiceSettings;
use reel_events::ArtifactRef;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;

const HISTORY_FILE: &str = "history.json";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Everything needed to list, inspect and restore a finalized run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub run_id: RunId,
    pub created_at: Timestamp,
    pub theme: String,
    #[serde(default)]
    pub mock: bool,
    pub script: Script,
    #[serde(default)]
    pub images: Vec<ArtifactRef>,
    #[serde(default)]
    pub videos: Vec<ArtifactRef>,
    #[serde(default)]
    pub voices: Vec<ArtifactRef>,
    pub video_url: Option<String>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub voice_settings: VoiceSettings,
}

/// Listing row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub run_id: RunId,
    pub created_at: Timestamp,
    pub theme: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub video_url: Option<String>,
    pub scene_count: usize,
}

impl From<&HistoryEntry> for HistorySummary {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            run_id: entry.run_id.clone(),
            created_at: entry.created_at,
            theme: entry.theme.clone(),
            title: entry.script.title.clone(),
            thumbnail: entry.images.first().map(|i| i.url.clone()),
            video_url: entry.video_url.clone(),
            scene_count: entry.script.scene_count(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// JSON-file history index.
///
/// Every read-modify-write cycle holds the store's mutex, and the file is
/// replaced by rename so a crash never leaves a half-written index.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryStore {
    /// Index stored as `history.json` under `output_root`.
    pub fn new(output_root: impl AsRef<Path>) -> Self {
        Self {
            path: output_root.as_ref().join(HISTORY_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace the entry for `entry.run_id`.
    pub async fn upsert(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.retain(|e| e.run_id != entry.run_id);
        tracing::info!(run_id = %entry.run_id, "History entry saved");
        entries.insert(0, entry);
        // Newest first; stable so same-instant entries keep insertion order.
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.save(&entries).await
    }

    /// Summaries, newest first.
    pub async fn list(&self) -> Result<Vec<HistorySummary>, StoreError> {
        let _guard = self.lock.lock().await;
        let entries = self.load().await?;
        Ok(entries.iter().map(HistorySummary::from).collect())
    }

    pub async fn get(&self, run_id: &RunId) -> Result<HistoryEntry, StoreError> {
        let _guard = self.lock.lock().await;
        self.load()
            .await?
            .into_iter()
            .find(|e| &e.run_id == run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))
    }

    /// Remove an entry. The run's files stay on disk.
    pub async fn delete(&self, run_id: &RunId) -> Result<HistoryEntry, StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let pos = entries
            .iter()
            .position(|e| &e.run_id == run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))?;
        let removed = entries.remove(pos);
        self.save(&entries).await?;
        tracing::info!(run_id = %run_id, "History entry deleted");
        Ok(removed)
    }

    async fn load(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    async fn save(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| StoreError::io(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
