//! Latest-wins narration player.
//!
//! The player speaks one text at a time through an exclusively owned
//! [`AudioSink`]. While something plays, a single pending slot holds the next
//! text; a newer submission replaces it, so a backlog of stale scene
//! descriptions is never narrated. A failed utterance is reported and the
//! player moves on to the pending slot as if it had finished normally.

use crate::audio::{AudioClip, AudioSink, Playback};
use crate::error::{Result, SightlineError};
use crate::narrate::service::NarrationService;
use crate::pipeline::error::{ErrorReporter, LogReporter, Origin};
use crate::pipeline::events::{EventSender, PipelineEvent};
use crate::settings::Settings;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// One text waiting to be spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationRequest {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
}

/// Why a submission was dropped without being queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Muted,
    MissingCredential,
    EmptyText,
}

/// What [`NarrationPlayer::submit`] did with the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Player was idle; narration of this text has begun.
    Started,
    /// Stored in the empty pending slot.
    Queued,
    /// Replaced an older pending text.
    Replaced,
    Dropped(DropReason),
}

#[derive(Debug)]
struct PlayerInner {
    state: PlayerState,
    pending: Option<NarrationRequest>,
    // Text currently audible, if any
    sounding: Option<String>,
    // Bumped by stop(); workers from an older epoch must not touch the sink
    epoch: u64,
}

fn lock_inner(inner: &Mutex<PlayerInner>) -> MutexGuard<'_, PlayerInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Speaks submitted text, newest first, never overlapping.
pub struct NarrationPlayer {
    service: Arc<dyn NarrationService>,
    sink: Arc<dyn AudioSink>,
    settings: Arc<Settings>,
    inner: Arc<Mutex<PlayerInner>>,
    playing: Arc<watch::Sender<bool>>,
    events: EventSender,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl NarrationPlayer {
    pub fn new(
        service: Arc<dyn NarrationService>,
        sink: Arc<dyn AudioSink>,
        settings: Arc<Settings>,
    ) -> Self {
        let (playing, _) = watch::channel(false);
        Self {
            service,
            sink,
            settings,
            inner: Arc::new(Mutex::new(PlayerInner {
                state: PlayerState::Idle,
                pending: None,
                sounding: None,
                epoch: 0,
            })),
            playing: Arc::new(playing),
            events: EventSender::disabled(),
            error_reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn state(&self) -> PlayerState {
        lock_inner(&self.inner).state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    /// Text waiting for the current utterance to finish, if any.
    pub fn pending(&self) -> Option<String> {
        lock_inner(&self.inner).pending.as_ref().map(|r| r.text.clone())
    }

    /// Watch the playing flag.
    pub fn subscribe_playing(&self) -> watch::Receiver<bool> {
        self.playing.subscribe()
    }

    /// Resolve once the player has gone idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.playing.subscribe();
        // Sender lives as long as self, so this cannot fail while we hold &self
        if rx.wait_for(|playing| !*playing).await.is_err() {
            log::debug!("playing flag closed while waiting for idle");
        }
    }

    /// Submit text for narration.
    ///
    /// Dropped when muted, when no narration key is configured, or when the
    /// text is blank. Never interrupts an utterance already started. Must be
    /// called within a tokio runtime.
    pub fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Dropped(DropReason::EmptyText);
        }
        if self.settings.is_muted() {
            log::debug!("narration muted, dropping text");
            return SubmitOutcome::Dropped(DropReason::Muted);
        }
        if self.settings.narration_key().is_none() {
            log::debug!("no narration key configured, dropping text");
            return SubmitOutcome::Dropped(DropReason::MissingCredential);
        }

        let request = NarrationRequest {
            text: text.to_string(),
        };

        let mut inner = lock_inner(&self.inner);
        if inner.state == PlayerState::Playing {
            return match inner.pending.replace(request) {
                Some(old) => {
                    log::debug!("replacing pending narration: {}", old.text);
                    SubmitOutcome::Replaced
                }
                None => SubmitOutcome::Queued,
            };
        }

        inner.state = PlayerState::Playing;
        let epoch = inner.epoch;
        drop(inner);
        self.playing.send_replace(true);

        let worker = self.worker();
        tokio::spawn(async move { worker.run(epoch, request).await });
        SubmitOutcome::Started
    }

    /// Clear the pending slot, halt audio and release the device.
    ///
    /// Returns immediately. A synthesis call still in flight is left to finish
    /// and its audio is thrown away. Idempotent.
    pub fn stop(&self) {
        let mut inner = lock_inner(&self.inner);
        inner.pending = None;
        inner.epoch += 1;
        inner.state = PlayerState::Idle;
        self.sink.stop();
        if let Some(text) = inner.sounding.take() {
            self.events.send(PipelineEvent::NarrationFinished { text });
        }
        drop(inner);
        self.playing.send_replace(false);
    }

    fn worker(&self) -> PlayerWorker {
        PlayerWorker {
            service: Arc::clone(&self.service),
            sink: Arc::clone(&self.sink),
            settings: Arc::clone(&self.settings),
            inner: Arc::clone(&self.inner),
            playing: Arc::clone(&self.playing),
            events: self.events.clone(),
            error_reporter: Arc::clone(&self.error_reporter),
        }
    }
}

impl Drop for NarrationPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Task side of the player: drains the pending slot until it is empty.
struct PlayerWorker {
    service: Arc<dyn NarrationService>,
    sink: Arc<dyn AudioSink>,
    settings: Arc<Settings>,
    inner: Arc<Mutex<PlayerInner>>,
    playing: Arc<watch::Sender<bool>>,
    events: EventSender,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl PlayerWorker {
    async fn run(self, epoch: u64, first: NarrationRequest) {
        let mut next = Some(first);
        while let Some(request) = next {
            if let Err(e) = self.speak(epoch, &request).await {
                self.error_reporter.report(Origin::Narration, &e);
            }
            next = self.advance(epoch);
        }
    }

    /// Synthesize and play one request. Ok(()) also covers results discarded by stop().
    async fn speak(&self, epoch: u64, request: &NarrationRequest) -> Result<()> {
        let api_key =
            self.settings
                .narration_key()
                .ok_or_else(|| SightlineError::Unauthenticated {
                    service: "ElevenLabs".to_string(),
                })?;

        log::debug!("Synthesizing narration with {}", self.service.name());
        let clip = self.service.synthesize(&api_key, &request.text).await?;

        let Some(playback) = self.start_playback(epoch, clip, &request.text)? else {
            return Ok(());
        };
        let result = playback.wait().await;

        let mut inner = lock_inner(&self.inner);
        if inner.epoch != epoch {
            // stop() already halted the audio and announced the finish
            return Ok(());
        }
        // Release the device between utterances
        self.sink.stop();
        if let Some(text) = inner.sounding.take() {
            self.events.send(PipelineEvent::NarrationFinished { text });
        }
        result
    }

    /// Start the clip unless stop() has intervened. Runs under the player lock
    /// so a concurrent stop() either sees the clip sounding or prevents it.
    fn start_playback(
        &self,
        epoch: u64,
        clip: AudioClip,
        text: &str,
    ) -> Result<Option<Playback>> {
        let mut inner = lock_inner(&self.inner);
        if inner.epoch != epoch {
            log::debug!("narration stopped during synthesis, discarding audio");
            return Ok(None);
        }

        let playback = self.sink.play(clip)?;
        inner.sounding = Some(text.to_string());
        self.events.send(PipelineEvent::NarrationStarted {
            text: text.to_string(),
        });
        log::info!("Narrating: {}", text);
        Ok(Some(playback))
    }

    /// Take the pending request, or go idle when there is none.
    fn advance(&self, epoch: u64) -> Option<NarrationRequest> {
        let mut inner = lock_inner(&self.inner);
        if inner.epoch != epoch {
            return None;
        }
        if let Some(request) = inner.pending.take() {
            return Some(request);
        }
        inner.state = PlayerState::Idle;
        drop(inner);
        self.playing.send_replace(false);
        None
    }
}
