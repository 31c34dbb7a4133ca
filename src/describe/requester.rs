//! Single-flight scene description.
//!
//! A trigger captures one snapshot and makes one description call. While a call
//! is outstanding every further trigger is a no-op, so concurrent triggers
//! collapse into one network request. Results identical to the last published
//! text are dropped so an unchanged scene is not narrated twice.

use crate::defaults;
use crate::describe::service::{DescriptionRequest, DescriptionService};
use crate::error::{Result, SightlineError};
use crate::frame::FrameSource;
use crate::pipeline::error::{ErrorReporter, LogReporter, Origin};
use crate::pipeline::events::{EventSender, PipelineEvent};
use crate::settings::Settings;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Request state of a [`DescriptionRequester`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    InFlight,
}

/// A published scene description.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptionResult {
    pub text: String,
    pub source_frame_timestamp: SystemTime,
}

impl DescriptionResult {
    /// Capture time as milliseconds since the Unix epoch.
    pub fn captured_at_ms(&self) -> u64 {
        self.source_frame_timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// What a successful trigger did.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// New text was published.
    Published(DescriptionResult),
    /// The service answered with empty text or the same text as last time.
    Unchanged,
    /// The requester was stopped while the call was outstanding; result dropped.
    Discarded,
    /// Another request is in flight; nothing was sent.
    Busy,
}

#[derive(Debug)]
struct RequesterState {
    phase: RequestPhase,
    // Bumped by stop(); results from an older epoch are discarded.
    epoch: u64,
    last_text: Option<String>,
}

/// Returns the phase to Idle when the request finishes, fails or is dropped.
struct InFlightGuard {
    state: Arc<Mutex<RequesterState>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_state(&self.state).phase = RequestPhase::Idle;
    }
}

fn lock_state(state: &Mutex<RequesterState>) -> MutexGuard<'_, RequesterState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Captures frames and submits them to a [`DescriptionService`], one at a time.
pub struct DescriptionRequester {
    service: Arc<dyn DescriptionService>,
    settings: Arc<Settings>,
    instruction: String,
    state: Arc<Mutex<RequesterState>>,
    events: EventSender,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl DescriptionRequester {
    pub fn new(service: Arc<dyn DescriptionService>, settings: Arc<Settings>) -> Self {
        Self {
            service,
            settings,
            instruction: defaults::DESCRIPTION_PROMPT.to_string(),
            state: Arc::new(Mutex::new(RequesterState {
                phase: RequestPhase::Idle,
                epoch: 0,
                last_text: None,
            })),
            events: EventSender::disabled(),
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Override the instruction sent with every image.
    pub fn with_instruction(mut self, instruction: &str) -> Self {
        self.instruction = instruction.to_string();
        self
    }

    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn phase(&self) -> RequestPhase {
        lock_state(&self.state).phase
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase() == RequestPhase::InFlight
    }

    /// Last published description text, if any.
    pub fn last_description(&self) -> Option<String> {
        lock_state(&self.state).last_text.clone()
    }

    /// Capture one snapshot and request a description of it.
    ///
    /// Returns `Busy` without side effects while another request is in flight,
    /// and `Unauthenticated` (not reported) when no key is configured. Service
    /// and capture failures are reported once and returned; the requester is
    /// ready for the next trigger either way. No automatic retries.
    pub async fn trigger(&self, source: &dyn FrameSource) -> Result<TriggerOutcome> {
        let api_key = self
            .settings
            .description_key()
            .ok_or_else(|| SightlineError::Unauthenticated {
                service: "Gemini".to_string(),
            })?;

        let (epoch, _guard) = {
            let mut state = lock_state(&self.state);
            if state.phase == RequestPhase::InFlight {
                log::debug!("description request already in flight, skipping trigger");
                return Ok(TriggerOutcome::Busy);
            }
            state.phase = RequestPhase::InFlight;
            (
                state.epoch,
                InFlightGuard {
                    state: self.state.clone(),
                },
            )
        };

        match self.request(&api_key, source).await {
            Ok((text, captured_at)) => Ok(self.publish(epoch, text, captured_at)),
            Err(e) => {
                self.error_reporter.report(Origin::Description, &e);
                Err(e)
            }
        }
    }

    async fn request(
        &self,
        api_key: &str,
        source: &dyn FrameSource,
    ) -> Result<(String, SystemTime)> {
        let snapshot = source.snapshot()?;
        let captured_at = snapshot.captured_at;
        let request = DescriptionRequest::new(&self.instruction, snapshot);

        log::debug!(
            "Requesting description from {} ({} bytes)",
            self.service.name(),
            request.image.bytes.len()
        );
        let text = self.service.describe(api_key, &request).await?;
        Ok((text, captured_at))
    }

    fn publish(&self, epoch: u64, text: String, captured_at: SystemTime) -> TriggerOutcome {
        let text = text.trim();
        let mut state = lock_state(&self.state);

        if state.epoch != epoch {
            return TriggerOutcome::Discarded;
        }
        if text.is_empty() || state.last_text.as_deref() == Some(text) {
            return TriggerOutcome::Unchanged;
        }

        state.last_text = Some(text.to_string());
        drop(state);

        let result = DescriptionResult {
            text: text.to_string(),
            source_frame_timestamp: captured_at,
        };
        log::info!("New description: {}", result.text);
        self.events.send(PipelineEvent::Description {
            text: result.text.clone(),
            captured_at_ms: result.captured_at_ms(),
        });
        TriggerOutcome::Published(result)
    }

    /// Forget the last published text and discard any outstanding result.
    ///
    /// Returns immediately. An outstanding call still drains before the next
    /// trigger can send, so calls never overlap. Idempotent.
    pub fn stop(&self) {
        let mut state = lock_state(&self.state);
        state.epoch += 1;
        state.last_text = None;
    }
}
