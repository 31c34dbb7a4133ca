//! ElevenLabs streaming text-to-speech client.

use crate::audio::AudioClip;
use crate::defaults;
use crate::error::{Result, SightlineError};
use crate::narrate::service::{NarrationService, VoiceParameters, narration_error_for_status};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};

/// HTTP client for the ElevenLabs streaming endpoint.
///
/// Requests raw 16 kHz PCM so clips can go straight to an output device.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    client: reqwest::Client,
    base_url: String,
    voice: VoiceParameters,
}

impl ElevenLabsClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: defaults::ELEVENLABS_BASE_URL.to_string(),
            voice: VoiceParameters::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_voice(mut self, voice: VoiceParameters) -> Self {
        self.voice = voice;
        self
    }

    pub fn voice(&self) -> &VoiceParameters {
        &self.voice
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/text-to-speech/{}/stream?output_format=pcm_{}",
            self.base_url,
            self.voice.voice_id,
            defaults::NARRATION_SAMPLE_RATE
        )
    }

    pub fn request_body(&self, text: &str) -> Value {
        json!({
            "text": text,
            "model_id": self.voice.model_id,
            "voice_settings": {
                "stability": self.voice.stability,
                "similarity_boost": self.voice.similarity_boost,
                "speed": self.voice.speed,
            }
        })
    }
}

impl Default for ElevenLabsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl NarrationService for ElevenLabsClient {
    async fn synthesize(&self, api_key: &str, text: &str) -> Result<AudioClip> {
        let body = serde_json::to_vec(&self.request_body(text)).map_err(|e| {
            SightlineError::Other(format!("Failed to encode ElevenLabs request: {e}"))
        })?;

        let response = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .header("xi-api-key", api_key)
            .body(body)
            .send()
            .await
            .map_err(|e| SightlineError::NetworkFailure {
                message: format!("Failed to reach ElevenLabs: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(narration_error_for_status(status.as_u16()));
        }

        let mut audio = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SightlineError::NetworkFailure {
                message: format!("Failed to read ElevenLabs audio: {e}"),
            })?;
            audio.extend_from_slice(&chunk);
        }

        log::debug!("Received {} bytes of narration audio", audio.len());
        Ok(AudioClip::pcm16(audio))
    }

    fn name(&self) -> &str {
        "elevenlabs"
    }
}
