//! On-disk state: per-run artifact directories and the history index.

pub mod error;
pub mod history;
pub mod layout;

pub use error::StoreError;
pub use history::{HistoryEntry, HistoryStore, HistorySummary};
pub use layout::{ArtifactKind, RunLayout, OUTPUT_URL_PREFIX};
