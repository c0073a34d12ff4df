//! Partial regeneration: which positions to recompute, and folding the
//! fresh results back into an existing artifact list.

use reel_core::error::CoreError;
use reel_core::script::Script;
use reel_core::types::SceneId;

/// Positions a stage invocation will recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegenPlan {
    /// Every scene.
    Full,
    /// Only these positions, sorted and unique. Never empty.
    Partial(Vec<usize>),
}

impl RegenPlan {
    /// Positions to compute for a script of `scene_count` scenes.
    pub fn positions(&self, scene_count: usize) -> Vec<usize> {
        match self {
            RegenPlan::Full => (0..scene_count).collect(),
            RegenPlan::Partial(positions) => positions.clone(),
        }
    }
}

/// Decide how much of a stage to run.
///
/// Target ids are checked against the script first, so an unknown id fails
/// the call before anything else happens. Without targets, or without a
/// complete existing list to merge into, the whole stage runs.
pub fn plan_regeneration<T>(
    script: &Script,
    existing: Option<&[T]>,
    targets: Option<&[SceneId]>,
) -> Result<RegenPlan, CoreError> {
    let positions = match targets {
        Some(ids) if !ids.is_empty() => script.resolve_targets(ids)?,
        _ => return Ok(RegenPlan::Full),
    };

    match existing {
        Some(list) if list.len() == script.scene_count() => Ok(RegenPlan::Partial(positions)),
        _ => Ok(RegenPlan::Full),
    }
}

/// Replace `positions` of `existing` with `fresh`, pairwise.
///
/// Every other entry is carried over as-is.
pub fn merge<T: Clone>(existing: &[T], positions: &[usize], fresh: Vec<T>) -> Result<Vec<T>, CoreError> {
    if positions.len() != fresh.len() {
        return Err(CoreError::Internal(format!(
            "{} regenerated artifacts for {} positions",
            fresh.len(),
            positions.len()
        )));
    }
    let mut merged = existing.to_vec();
    for (&pos, value) in positions.iter().zip(fresh) {
        let slot = merged.get_mut(pos).ok_or_else(|| {
            CoreError::Internal(format!("position {pos} outside artifact list"))
        })?;
        *slot = value;
    }
    Ok(merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
