//! Events published by the pipeline to UI collaborators.
//!
//! Events are serialized as tagged JSON (`{"type": "description", ...}`) so
//! they can be forwarded to another process unchanged.

use crate::detect::DetectionSet;
use crate::error::ErrorKind;
use crate::pipeline::error::Origin;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// Everything the pipeline tells the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A detection cycle published a new set.
    Detections { detections: DetectionSet },
    /// A new (changed) scene description.
    Description {
        text: String,
        /// Capture time of the source frame, milliseconds since the Unix epoch.
        captured_at_ms: u64,
    },
    /// An utterance started playing.
    NarrationStarted { text: String },
    /// An utterance stopped playing (finished, failed or halted).
    NarrationFinished { text: String },
    /// A component failed; internal state has already recovered.
    Error {
        origin: Origin,
        kind: ErrorKind,
        message: String,
    },
}

impl PipelineEvent {
    /// Serialize event to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Superseded by the next event of the same kind (detection updates).
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineEvent::Detections { .. })
    }
}

/// Non-blocking event publisher.
///
/// Publishing never waits: when the channel is full or the receiver is gone the
/// event is dropped. Transient events may only fill half of a bounded channel,
/// so a detection stream never crowds out errors or descriptions. A disabled
/// sender drops everything.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<Sender<PipelineEvent>>,
}

impl EventSender {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sender that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.tx {
            if event.is_transient()
                && let Some(capacity) = tx.capacity()
                && tx.len() * 2 >= capacity
            {
                log::trace!("event channel half full, skipping detection update");
                return;
            }
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => log::debug!("event channel full, dropping event"),
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

/// Create a bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSender, Receiver<PipelineEvent>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (EventSender::new(tx), rx)
}
