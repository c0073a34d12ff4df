//! Per-run output directory layout.
//!
//! ```text
//! {root}/{run_id}/
//! ├── script.json
//! ├── scene_{id}.png        still
//! ├── scene_{id}.mp4        clip
//! ├── voice_{id}_raw.wav    narration before tempo fitting
//! ├── voice_{id}.wav        narration
//! ├── composed_{n}.mp4      muxed scene, removed after the final join
//! ├── concat_list.txt       removed after the final join
//! └── final.mp4
//! ```
//!
//! File names depend only on scene id and stage, so concurrent workers
//! inside one run never write the same path.

use std::path::{Path, PathBuf};

use reel_core::script::Script;
use reel_core::types::{RunId, SceneId};

use crate::error::StoreError;

/// URL prefix under which the output root is served.
pub const OUTPUT_URL_PREFIX: &str = "/output";

const SCRIPT_FILE: &str = "script.json";
const FINAL_FILE: &str = "final.mp4";
const CONCAT_LIST_FILE: &str = "concat_list.txt";

/// Per-scene artifact families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Video,
    Voice,
}

impl ArtifactKind {
    fn file_name(self, scene_id: SceneId) -> String {
        match self {
            ArtifactKind::Image => format!("scene_{scene_id}.png"),
            ArtifactKind::Video => format!("scene_{scene_id}.mp4"),
            ArtifactKind::Voice => format!("voice_{scene_id}.wav"),
        }
    }
}

/// Paths owned by one run.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
    run_id: RunId,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>, run_id: RunId) -> Self {
        Self {
            root: root.into(),
            run_id,
        }
    }

    /// The run's own directory.
    pub fn dir(&self) -> PathBuf {
        self.root.join(self.run_id.as_str())
    }

    pub async fn ensure_dir(&self) -> Result<PathBuf, StoreError> {
        let dir = self.dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        Ok(dir)
    }

    pub fn artifact(&self, kind: ArtifactKind, scene_id: SceneId) -> PathBuf {
        self.dir().join(kind.file_name(scene_id))
    }

    pub fn image(&self, scene_id: SceneId) -> PathBuf {
        self.artifact(ArtifactKind::Image, scene_id)
    }

    pub fn video(&self, scene_id: SceneId) -> PathBuf {
        self.artifact(ArtifactKind::Video, scene_id)
    }

    pub fn voice(&self, scene_id: SceneId) -> PathBuf {
        self.artifact(ArtifactKind::Voice, scene_id)
    }

    pub fn raw_voice(&self, scene_id: SceneId) -> PathBuf {
        self.dir().join(format!("voice_{scene_id}_raw.wav"))
    }

    /// Muxed scene at 1-based `position` of the final order.
    pub fn composed(&self, position: usize) -> PathBuf {
        self.dir().join(format!("composed_{position}.mp4"))
    }

    pub fn concat_list(&self) -> PathBuf {
        self.dir().join(CONCAT_LIST_FILE)
    }

    pub fn final_video(&self) -> PathBuf {
        self.dir().join(FINAL_FILE)
    }

    pub fn script_file(&self) -> PathBuf {
        self.dir().join(SCRIPT_FILE)
    }

    /// Write the script as pretty JSON.
    pub async fn save_script(&self, script: &Script) -> Result<(), StoreError> {
        self.ensure_dir().await?;
        let path = self.script_file();
        let json = serde_json::to_vec_pretty(script)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Public URL for a file inside the output root.
    ///
    /// `version` is appended as a `t` query parameter so clients refetch a
    /// file that was regenerated under the same name.
    pub fn url_for(&self, path: &Path, version: Option<i64>) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(match version {
            Some(t) => format!("{OUTPUT_URL_PREFIX}/{rel}?t={t}"),
            None => format!("{OUTPUT_URL_PREFIX}/{rel}"),
        })
    }

    /// Existing artifacts of one kind, in script order.
    ///
    /// Returns `None` unless every scene has its file.
    pub async fn existing(&self, kind: ArtifactKind, script: &Script) -> Option<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(script.scene_count());
        for scene in &script.scenes {
            let path = self.artifact(kind, scene.scene_id);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return None;
            }
            paths.push(path);
        }
        Some(paths)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
