use crate::audio::AudioClip;
use crate::defaults;
use crate::error::{Result, SightlineError};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Voice settings sent with every synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceParameters {
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub speed: f32,
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self {
            voice_id: defaults::ELEVENLABS_VOICE_ID.to_string(),
            model_id: defaults::ELEVENLABS_MODEL.to_string(),
            stability: defaults::VOICE_STABILITY,
            similarity_boost: defaults::VOICE_SIMILARITY,
            speed: defaults::VOICE_SPEED,
        }
    }
}

/// Trait for text-to-speech backends.
#[async_trait::async_trait]
pub trait NarrationService: Send + Sync {
    /// Synthesize `text` into a playable clip.
    async fn synthesize(&self, api_key: &str, text: &str) -> Result<AudioClip>;

    /// Name for logging/debugging.
    fn name(&self) -> &str;
}

/// Map a non-success HTTP status from the narration service to an error.
pub fn narration_error_for_status(status: u16) -> SightlineError {
    match status {
        429 => SightlineError::RateLimited {
            message: "ElevenLabs rate limit exceeded. Please wait a moment before trying again."
                .to_string(),
        },
        401 | 403 => SightlineError::Unauthenticated {
            service: "ElevenLabs".to_string(),
        },
        _ => SightlineError::NetworkFailure {
            message: format!("ElevenLabs API error: {status}"),
        },
    }
}

/// Mock narration service for testing.
///
/// The clip it returns carries the text's UTF-8 bytes, so a mock sink can tell
/// which text is playing.
#[derive(Debug)]
pub struct MockNarrationService {
    delay: Duration,
    failure_status: Option<u16>,
    fail_texts: Vec<String>,
    calls: AtomicU32,
    texts: Mutex<Vec<String>>,
}

impl MockNarrationService {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            failure_status: None,
            fail_texts: Vec::new(),
            calls: AtomicU32::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Configure how long each synthesis takes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Configure every call to fail with an HTTP status
    pub fn with_failure(mut self, status: u16) -> Self {
        self.failure_status = Some(status);
        self
    }

    /// Configure calls for one specific text to fail with a network error
    pub fn with_failure_for(mut self, text: &str) -> Self {
        self.fail_texts.push(text.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts synthesized so far, oldest first
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl Default for MockNarrationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl NarrationService for MockNarrationService {
    async fn synthesize(&self, _api_key: &str, text: &str) -> Result<AudioClip> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(status) = self.failure_status {
            return Err(narration_error_for_status(status));
        }
        if self.fail_texts.iter().any(|t| t == text) {
            return Err(narration_error_for_status(500));
        }

        Ok(AudioClip::pcm16(text.as_bytes().to_vec()))
    }

    fn name(&self) -> &str {
        "mock-narration"
    }
}
