//! Error reporting for pipeline components.

use crate::error::{ErrorKind, SightlineError};
use crate::pipeline::events::{EventSender, PipelineEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Subsystem an error or event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Detection,
    Description,
    Narration,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::Detection => "detection",
            Origin::Description => "description",
            Origin::Narration => "narration",
        };
        f.write_str(name)
    }
}

/// Trait for reporting component errors.
///
/// Components call `report` exactly once per failed operation, after their
/// internal state has already been recovered.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a component.
    fn report(&self, origin: Origin, error: &SightlineError);
}

/// Reporter that writes to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, origin: Origin, error: &SightlineError) {
        log::warn!("[{}] {}", origin, error);
    }
}

/// Reporter that logs and publishes an [`PipelineEvent::Error`].
#[derive(Debug, Clone)]
pub struct EventReporter {
    events: EventSender,
}

impl EventReporter {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

impl ErrorReporter for EventReporter {
    fn report(&self, origin: Origin, error: &SightlineError) {
        LogReporter.report(origin, error);
        self.events.send(PipelineEvent::Error {
            origin,
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}

/// A reported error, as captured by [`CollectingReporter`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedError {
    pub origin: Origin,
    pub kind: ErrorKind,
    pub message: String,
}

/// Reporter that keeps every report in memory (for tests and embedding).
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<ReportedError>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all reports so far, oldest first.
    pub fn reports(&self) -> Vec<ReportedError> {
        match self.reports.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.reports().into_iter().map(|r| r.kind).collect()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, origin: Origin, error: &SightlineError) {
        let entry = ReportedError {
            origin,
            kind: error.kind(),
            message: error.to_string(),
        };
        match self.reports.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
