//! Audio output abstraction.
//!
//! An [`AudioSink`] starts playing a clip synchronously and hands back a
//! [`Playback`] that resolves when the clip finishes. `stop()` halts output and
//! releases the device; any outstanding `Playback` then resolves as finished.

use crate::defaults;
use crate::error::{Result, SightlineError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Synthesized speech: 16-bit little-endian mono PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, sample_rate: u32) -> Self {
        Self { bytes, sample_rate }
    }

    /// A clip at the narration service's output rate.
    pub fn pcm16(bytes: Vec<u8>) -> Self {
        Self::new(bytes, defaults::NARRATION_SAMPLE_RATE)
    }

    /// Decode into samples. A trailing odd byte is ignored.
    pub fn samples(&self) -> Vec<i16> {
        self.bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let samples = (self.bytes.len() / 2) as u64;
        Duration::from_micros(samples * 1_000_000 / self.sample_rate as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.len() < 2
    }
}

/// Completion side of a [`Playback`], held by the sink's output path.
#[derive(Debug)]
pub struct PlaybackDone(oneshot::Sender<Result<()>>);

impl PlaybackDone {
    pub fn finish(self, result: Result<()>) {
        if self.0.send(result).is_err() {
            log::trace!("playback finished with nobody waiting");
        }
    }
}

/// Handle resolving when a started clip stops sounding.
#[derive(Debug)]
pub struct Playback {
    rx: oneshot::Receiver<Result<()>>,
}

impl Playback {
    pub fn channel() -> (PlaybackDone, Playback) {
        let (tx, rx) = oneshot::channel();
        (PlaybackDone(tx), Playback { rx })
    }

    /// A playback that has already ended with `result`.
    pub fn finished(result: Result<()>) -> Self {
        let (done, playback) = Self::channel();
        done.finish(result);
        playback
    }

    /// Wait for the clip to end. A halted clip counts as finished.
    pub async fn wait(self) -> Result<()> {
        self.rx.await.unwrap_or(Ok(()))
    }
}

/// Exclusive audio output device.
pub trait AudioSink: Send + Sync {
    /// Start playing `clip`, replacing anything still sounding.
    fn play(&self, clip: AudioClip) -> Result<Playback>;

    /// Halt output and release the device. Idempotent.
    fn stop(&self);

    fn name(&self) -> &str;
}

impl<T: AudioSink + ?Sized> AudioSink for Arc<T> {
    fn play(&self, clip: AudioClip) -> Result<Playback> {
        (**self).play(clip)
    }

    fn stop(&self) {
        (**self).stop()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Sink that discards every clip, for runs where nothing may be spoken.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn play(&self, clip: AudioClip) -> Result<Playback> {
        log::debug!("discarding {} bytes of audio", clip.bytes.len());
        Ok(Playback::finished(Ok(())))
    }

    fn stop(&self) {}

    fn name(&self) -> &str {
        "null"
    }
}

#[derive(Debug, Default)]
struct MockSinkState {
    started: Vec<AudioClip>,
    current: Option<(u64, PlaybackDone)>,
    next_id: u64,
    overlaps: u32,
    interruptions: u32,
}

/// Mock audio sink for testing.
///
/// Each clip "plays" for a fixed duration on the tokio clock. Starting a clip
/// while another is still sounding is recorded as an overlap.
#[derive(Debug)]
pub struct MockAudioSink {
    state: Arc<Mutex<MockSinkState>>,
    clip_duration: Duration,
    fail_play: bool,
    fail_during_playback: bool,
    play_calls: AtomicU32,
}

impl MockAudioSink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockSinkState::default())),
            clip_duration: Duration::from_millis(100),
            fail_play: false,
            fail_during_playback: false,
            play_calls: AtomicU32::new(0),
        }
    }

    /// Configure how long each clip sounds
    pub fn with_clip_duration(mut self, duration: Duration) -> Self {
        self.clip_duration = duration;
        self
    }

    /// Configure play() to fail immediately
    pub fn with_failure(mut self) -> Self {
        self.fail_play = true;
        self
    }

    /// Configure clips to start but end with a device error
    pub fn with_playback_error(mut self) -> Self {
        self.fail_during_playback = true;
        self
    }

    /// Clips started so far, oldest first
    pub fn started(&self) -> Vec<AudioClip> {
        self.with_state(|s| s.started.clone())
    }

    /// Started clips decoded as UTF-8 (mock narration encodes text as bytes)
    pub fn started_texts(&self) -> Vec<String> {
        self.started()
            .into_iter()
            .map(|clip| String::from_utf8_lossy(&clip.bytes).into_owned())
            .collect()
    }

    pub fn play_calls(&self) -> u32 {
        self.play_calls.load(Ordering::SeqCst)
    }

    /// Number of clips started while another was still sounding
    pub fn overlaps(&self) -> u32 {
        self.with_state(|s| s.overlaps)
    }

    /// Number of clips cut short by stop()
    pub fn interruptions(&self) -> u32 {
        self.with_state(|s| s.interruptions)
    }

    pub fn is_active(&self) -> bool {
        self.with_state(|s| s.current.is_some())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockSinkState) -> R) -> R {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl Default for MockAudioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for MockAudioSink {
    fn play(&self, clip: AudioClip) -> Result<Playback> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_play {
            return Err(SightlineError::PlaybackFailure {
                message: "mock device unavailable".to_string(),
            });
        }

        let (done, playback) = Playback::channel();
        let id = self.with_state(|s| {
            if s.current.is_some() {
                s.overlaps += 1;
            }
            s.started.push(clip);
            s.next_id += 1;
            s.current = Some((s.next_id, done));
            s.next_id
        });

        let state = Arc::clone(&self.state);
        let duration = self.clip_duration;
        let fail = self.fail_during_playback;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let done = match state.lock() {
                Ok(mut s) => take_if_current(&mut s, id),
                Err(poisoned) => take_if_current(&mut poisoned.into_inner(), id),
            };
            if let Some(done) = done {
                let result = if fail {
                    Err(SightlineError::PlaybackFailure {
                        message: "mock device error".to_string(),
                    })
                } else {
                    Ok(())
                };
                done.finish(result);
            }
        });

        Ok(playback)
    }

    fn stop(&self) {
        self.with_state(|s| {
            if s.current.take().is_some() {
                s.interruptions += 1;
            }
        });
    }

    fn name(&self) -> &str {
        "mock-audio"
    }
}

fn take_if_current(state: &mut MockSinkState, id: u64) -> Option<PlaybackDone> {
    match state.current {
        Some((current, _)) if current == id => state.current.take().map(|(_, done)| done),
        _ => None,
    }
}
