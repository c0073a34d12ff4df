//! Per-run progress channels.
//!
//! Every stage admission opens a fresh unbounded channel for its run. The
//! stage worker holds the [`ProgressSender`]; at most one streaming client
//! holds the matching [`ProgressStream`] at a time.
//!
//! Delivery is at-most-once. Events wait in the channel until a consumer
//! attaches; once read they are gone, and nothing is replayed to later
//! consumers. If a consumer goes away before the terminal event, the
//! unread remainder of the channel is handed back so the next consumer
//! picks up where it left off.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reel_core::types::RunId;
use tokio::sync::mpsc;

use crate::event::ProgressEvent;

/// Default idle period before a keepalive is emitted.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AttachError {
    /// No stage has been started for the run, or its stream already ended.
    #[error("no progress stream is open for run {0}")]
    NotOpen(RunId),

    /// Another client is already consuming the stream.
    #[error("progress stream for run {0} already has a consumer")]
    Busy(RunId),
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

enum SlotState {
    /// Channel open, no consumer attached.
    Waiting(mpsc::UnboundedReceiver<ProgressEvent>),
    Attached,
    /// The terminal event has been delivered.
    Finished,
}

struct Slot {
    generation: u64,
    state: SlotState,
}

type Slots = Arc<Mutex<HashMap<RunId, Slot>>>;

/// Registry of progress channels keyed by run.
///
/// Cheap to clone; clones share the same channels.
#[derive(Clone, Default)]
pub struct ProgressHub {
    slots: Slots,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RunId, Slot>> {
        lock_slots(&self.slots)
    }

    /// Open a new channel for a run, replacing any previous one.
    ///
    /// Callers must only do this once the previous stage has finished;
    /// the orchestrator enforces that before calling.
    pub fn open(&self, run_id: &RunId) -> ProgressSender {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.lock();
        let generation = slots.get(run_id).map_or(1, |s| s.generation + 1);
        slots.insert(
            run_id.clone(),
            Slot {
                generation,
                state: SlotState::Waiting(rx),
            },
        );
        tracing::debug!(run_id = %run_id, generation, "Progress channel opened");
        ProgressSender {
            run_id: run_id.clone(),
            tx,
        }
    }

    /// Attach the single consumer of a run's current channel.
    pub fn attach(&self, run_id: &RunId, keepalive: Duration) -> Result<ProgressStream, AttachError> {
        let mut slots = self.lock();
        let slot = slots
            .get_mut(run_id)
            .ok_or_else(|| AttachError::NotOpen(run_id.clone()))?;

        match std::mem::replace(&mut slot.state, SlotState::Attached) {
            SlotState::Waiting(rx) => Ok(ProgressStream {
                run_id: run_id.clone(),
                generation: slot.generation,
                rx: Some(rx),
                slots: Arc::clone(&self.slots),
                keepalive,
                finished: false,
            }),
            SlotState::Attached => Err(AttachError::Busy(run_id.clone())),
            SlotState::Finished => {
                slot.state = SlotState::Finished;
                Err(AttachError::NotOpen(run_id.clone()))
            }
        }
    }

    /// Number of runs with a channel entry.
    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }
}

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<RunId, Slot>> {
    // A poisoned map only means another thread panicked mid-update of a
    // plain state enum; the data is still usable.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Producer half, owned by the active stage worker.
#[derive(Clone)]
pub struct ProgressSender {
    run_id: RunId,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// Queue an event. Events for a departed consumer are dropped.
    pub fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(run_id = %self.run_id, "Progress consumer gone, event dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// One item handed to the streaming transport.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(ProgressEvent),
    /// Nothing happened within the keepalive window.
    KeepAlive,
}

/// Consumer half of a run's progress channel.
pub struct ProgressStream {
    run_id: RunId,
    generation: u64,
    rx: Option<mpsc::UnboundedReceiver<ProgressEvent>>,
    slots: Slots,
    keepalive: Duration,
    finished: bool,
}

impl std::fmt::Debug for ProgressStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStream")
            .field("run_id", &self.run_id)
            .field("generation", &self.generation)
            .field("finished", &self.finished)
            .finish()
    }
}

impl ProgressStream {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the terminal event has been delivered, or if the
    /// producer went away without sending one.
    pub async fn next(&mut self) -> Option<StreamItem> {
        if self.finished {
            return None;
        }
        let rx = self.rx.as_mut()?;

        match tokio::time::timeout(self.keepalive, rx.recv()).await {
            Err(_) => Some(StreamItem::KeepAlive),
            Ok(None) => {
                self.finish();
                None
            }
            Ok(Some(event)) => {
                if event.is_terminal() {
                    self.finish();
                }
                Some(StreamItem::Event(event))
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.rx = None;
        let mut slots = lock_slots(&self.slots);
        if let Some(slot) = slots.get_mut(&self.run_id) {
            if slot.generation == self.generation {
                slot.state = SlotState::Finished;
            }
        }
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        // Hand unread events back for the next consumer.
        if let Some(rx) = self.rx.take() {
            let mut slots = lock_slots(&self.slots);
            if let Some(slot) = slots.get_mut(&self.run_id) {
                if slot.generation == self.generation {
                    slot.state = SlotState::Waiting(rx);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
