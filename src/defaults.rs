//! Default configuration constants for sightline.
//!
//! Shared constants used by the configuration types and the concrete service
//! clients, kept in one place so the file config and the library agree.

use std::time::Duration;

/// Minimum detection confidence. Detections scoring at or below this are
/// discarded before publication.
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Pause between detection cycles, roughly one display frame at 60 Hz.
///
/// The detection loop is self-paced: the pause starts after a cycle's result
/// is published, so slow inference lowers the effective rate instead of
/// queueing work.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// JPEG quality used for description snapshots (0-100).
pub const SNAPSHOT_JPEG_QUALITY: u8 = 80;

/// MIME type of encoded snapshots.
pub const SNAPSHOT_MIME_TYPE: &str = "image/jpeg";

/// Seconds between automatic description requests. 0 disables the timer.
pub const AUTO_DESCRIBE_SECS: u64 = 0;

/// Instruction sent with every description request.
pub const DESCRIPTION_PROMPT: &str = "You are an AI assistant for visually impaired users. \
Describe what you see in this image in 1-2 clear, concise sentences. \
Focus on: people, obstacles, objects, text/signs, and spatial layout. \
Be helpful and safety-focused. Speak directly to the user.";

/// Guidance surfaced when the description service rate-limits us.
pub const RATE_LIMIT_GUIDANCE: &str = "Rate limit exceeded. Please wait a moment before trying again, \
or check your Gemini API quota.";

/// Gemini REST endpoint root.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini model used for scene descriptions.
pub const GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Sampling temperature for scene descriptions.
pub const DESCRIPTION_TEMPERATURE: f32 = 0.4;

/// Token cap for a scene description (one or two sentences).
pub const DESCRIPTION_MAX_TOKENS: u32 = 150;

/// ElevenLabs REST endpoint root.
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// ElevenLabs voice ("Sarah").
pub const ELEVENLABS_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";

/// ElevenLabs low-latency model.
pub const ELEVENLABS_MODEL: &str = "eleven_turbo_v2_5";

/// Voice stability (0.0 to 1.0).
pub const VOICE_STABILITY: f32 = 0.5;

/// Voice similarity boost (0.0 to 1.0).
pub const VOICE_SIMILARITY: f32 = 0.75;

/// Speaking rate multiplier.
pub const VOICE_SPEED: f32 = 1.0;

/// Sample rate of synthesized narration audio (16-bit mono PCM).
pub const NARRATION_SAMPLE_RATE: u32 = 16000;

/// Capacity of the pipeline event channel.
pub const EVENT_BUFFER: usize = 256;
