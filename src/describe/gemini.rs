//! Gemini `generateContent` client for scene descriptions.

use crate::defaults;
use crate::describe::service::{DescriptionRequest, DescriptionService, description_error_for_status};
use crate::error::{Result, SightlineError};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};

/// HTTP client for the Gemini vision model.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: defaults::GEMINI_BASE_URL.to_string(),
            model: defaults::GEMINI_MODEL.to_string(),
            temperature: defaults::DESCRIPTION_TEMPERATURE,
            max_output_tokens: defaults::DESCRIPTION_MAX_TOKENS,
        }
    }

    /// Point the client at another endpoint root (proxies, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// JSON body for one request: instruction text followed by the inline image.
    pub fn request_body(&self, request: &DescriptionRequest) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": request.instruction },
                    {
                        "inline_data": {
                            "mime_type": request.image.mime_type,
                            "data": BASE64_STANDARD.encode(&request.image.bytes),
                        }
                    }
                ]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            }
        })
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract `candidates[0].content.parts[0].text`; a missing path yields "".
pub fn parse_description(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body).map_err(|e| SightlineError::NetworkFailure {
        message: format!("Failed to parse Gemini response: {e}"),
    })?;

    Ok(value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

#[async_trait::async_trait]
impl DescriptionService for GeminiClient {
    async fn describe(&self, api_key: &str, request: &DescriptionRequest) -> Result<String> {
        let body = serde_json::to_vec(&self.request_body(request))
            .map_err(|e| SightlineError::Other(format!("Failed to encode Gemini request: {e}")))?;

        let response = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", api_key)
            .body(body)
            .send()
            .await
            .map_err(|e| SightlineError::NetworkFailure {
                message: format!("Failed to reach Gemini: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(description_error_for_status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SightlineError::NetworkFailure {
                message: format!("Failed to read Gemini response: {e}"),
            })?;

        parse_description(&text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
