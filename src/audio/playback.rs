//! Speaker output using CPAL (Cross-Platform Audio Library).

use crate::audio::sink::{AudioClip, AudioSink, Playback, PlaybackDone};
use crate::error::{Result, SightlineError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only touched while holding the Mutex in CpalAudioSink,
/// and only to start it or drop it.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Samples left to play plus the completion signal for the current clip.
struct Cursor {
    samples: Vec<i16>,
    position: usize,
    done: Option<PlaybackDone>,
}

impl Cursor {
    /// Fill `out` with the next samples, padding with silence once drained.
    fn fill<T>(&mut self, out: &mut [T], convert: impl Fn(i16) -> T, silence: T)
    where
        T: Copy,
    {
        for slot in out.iter_mut() {
            *slot = match self.samples.get(self.position) {
                Some(&sample) => {
                    self.position += 1;
                    convert(sample)
                }
                None => silence,
            };
        }
        if self.position >= self.samples.len()
            && let Some(done) = self.done.take()
        {
            done.finish(Ok(()));
        }
    }

    fn fail(&mut self, message: String) {
        if let Some(done) = self.done.take() {
            done.finish(Err(SightlineError::PlaybackFailure { message }));
        }
    }
}

/// Plays mono PCM clips on the default output device.
///
/// One stream per clip; stop() drops the stream, which releases the device.
pub struct CpalAudioSink {
    device: cpal::Device,
    stream: Mutex<Option<SendableStream>>,
}

impl CpalAudioSink {
    /// Open the system default output device.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SightlineError::PlaybackFailure {
                message: "No audio output device available".to_string(),
            })?;

        Ok(Self {
            device,
            stream: Mutex::new(None),
        })
    }

    /// Build an output stream for `clip`.
    ///
    /// Tries i16 first, then f32 for devices that only expose float formats.
    fn build_stream(&self, clip: &AudioClip, done: PlaybackDone) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(clip.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let cursor = Arc::new(Mutex::new(Cursor {
            samples: clip.samples(),
            position: 0,
            done: Some(done),
        }));

        let error_cursor = Arc::clone(&cursor);
        let err_callback = move |err: cpal::StreamError| {
            log::warn!("Audio stream error: {}", err);
            if let Ok(mut c) = error_cursor.lock() {
                c.fail(err.to_string());
            }
        };

        let data_cursor = Arc::clone(&cursor);
        let i16_attempt = self.device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                if let Ok(mut c) = data_cursor.lock() {
                    c.fill(data, |s| s, 0);
                }
            },
            err_callback.clone(),
            None,
        );
        if let Ok(stream) = i16_attempt {
            return Ok(stream);
        }

        let data_cursor = Arc::clone(&cursor);
        self.device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut c) = data_cursor.lock() {
                        c.fill(data, |s| s as f32 / i16::MAX as f32, 0.0);
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| SightlineError::PlaybackFailure {
                message: format!("Failed to build output stream: {}", e),
            })
    }
}

impl AudioSink for CpalAudioSink {
    fn play(&self, clip: AudioClip) -> Result<Playback> {
        let mut guard = self
            .stream
            .lock()
            .map_err(|e| SightlineError::PlaybackFailure {
                message: format!("Failed to lock stream: {}", e),
            })?;
        // Release whatever was sounding before opening a new stream
        guard.take();

        let (done, playback) = Playback::channel();
        if clip.is_empty() {
            done.finish(Ok(()));
            return Ok(playback);
        }

        let stream = self.build_stream(&clip, done)?;
        stream.play().map_err(|e| SightlineError::PlaybackFailure {
            message: format!("Failed to start audio stream: {}", e),
        })?;
        *guard = Some(SendableStream(stream));

        log::debug!(
            "Playing {:.1}s clip at {} Hz",
            clip.duration().as_secs_f32(),
            clip.sample_rate
        );
        Ok(playback)
    }

    fn stop(&self) {
        let taken = match self.stream.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(SendableStream(stream)) = taken
            && let Err(e) = stream.pause()
        {
            log::debug!("Failed to pause output stream: {}", e);
        }
    }

    fn name(&self) -> &str {
        "cpal"
    }
}
