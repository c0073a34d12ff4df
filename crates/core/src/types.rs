use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Scene identifiers are 1-based and stable across edits.
pub type SceneId = u32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Maximum length of a run identifier.
const MAX_RUN_ID_LEN: usize = 64;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Opaque run identifier.
///
/// Doubles as the name of the run's output directory, so only ASCII
/// alphanumerics, `_` and `-` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Parse and validate a run identifier.
    pub fn parse(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_RUN_ID_LEN {
            return Err(CoreError::Validation(format!(
                "run id must be 1..={MAX_RUN_ID_LEN} characters"
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CoreError::Validation(format!(
                "run id '{value}' contains invalid characters"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RunId::parse(value)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Clock / id sources
// ---------------------------------------------------------------------------

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

/// Produces identifiers for new runs.
///
/// Implementations must return ids that sort by creation time.
pub trait IdSource: Send + Sync {
    fn next_id(&self, now: Timestamp) -> RunId;
}

/// Default id source: `YYYYMMDD_HHMMSS_mmm_xxxx`.
///
/// The trailing four hex digits come from the random half of a UUID v7 so
/// two runs created in the same millisecond still get distinct directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampIdSource;

impl IdSource for TimestampIdSource {
    fn next_id(&self, now: Timestamp) -> RunId {
        let uuid = uuid::Uuid::now_v7().simple().to_string();
        let suffix = &uuid[uuid.len() - 4..];
        RunId(format!("{}_{suffix}", now.format("%Y%m%d_%H%M%S_%3f")))
    }
}

/// Hands out a predetermined queue of ids, then falls back to timestamps.
///
/// Used when a run must be recreated under a known identifier.
#[derive(Debug, Default)]
pub struct FixedIdSource {
    queue: Mutex<VecDeque<RunId>>,
}

impl FixedIdSource {
    pub fn new(ids: impl IntoIterator<Item = RunId>) -> Self {
        Self {
            queue: Mutex::new(ids.into_iter().collect()),
        }
    }
}

impl IdSource for FixedIdSource {
    fn next_id(&self, now: Timestamp) -> RunId {
        let next = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        next.unwrap_or_else(|| TimestampIdSource.next_id(now))
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
