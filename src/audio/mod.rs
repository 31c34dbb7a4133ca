//! Audio output: clip type, sink abstraction and concrete sinks.

#[cfg(feature = "cpal-audio")]
pub mod playback;
pub mod sink;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use playback::CpalAudioSink;
pub use sink::{AudioClip, AudioSink, MockAudioSink, NullAudioSink, Playback, PlaybackDone};
pub use wav::WavFileSink;
