//! Progress reporting for pipeline runs.
//!
//! [`ProgressEvent`] is the closed set of things a stage worker can say;
//! [`ProgressHub`] routes them to the one client streaming each run.

pub mod event;
pub mod hub;

pub use event::{ArtifactRef, ProgressEvent, SceneProgress, WireEvent};
pub use hub::{AttachError, ProgressHub, ProgressSender, ProgressStream, StreamItem};
