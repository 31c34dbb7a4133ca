use crate::defaults;
use crate::error::{Result, SightlineError};
use crate::narrate::VoiceParameters;
use crate::pipeline::PipelineConfig;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub detection: DetectionConfig,
    pub description: DescriptionConfig,
    pub narration: NarrationConfig,
}

/// Service API keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub gemini_api_key: String,
    pub elevenlabs_api_key: String,
}

/// Object detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub min_confidence: f32,
    pub frame_interval_ms: u64,
}

/// Scene description configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DescriptionConfig {
    pub model: String,
    pub base_url: String,
    /// Seconds between automatic descriptions (0 = manual only)
    pub auto_interval_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub prompt: String,
}

/// Narration configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NarrationConfig {
    pub muted: bool,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub speed: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: defaults::MIN_CONFIDENCE,
            frame_interval_ms: defaults::FRAME_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        Self {
            model: defaults::GEMINI_MODEL.to_string(),
            base_url: defaults::GEMINI_BASE_URL.to_string(),
            auto_interval_secs: defaults::AUTO_DESCRIBE_SECS,
            temperature: defaults::DESCRIPTION_TEMPERATURE,
            max_output_tokens: defaults::DESCRIPTION_MAX_TOKENS,
            prompt: defaults::DESCRIPTION_PROMPT.to_string(),
        }
    }
}

impl Default for NarrationConfig {
    fn default() -> Self {
        let voice = VoiceParameters::default();
        Self {
            muted: false,
            base_url: defaults::ELEVENLABS_BASE_URL.to_string(),
            voice_id: voice.voice_id,
            model_id: voice.model_id,
            stability: voice.stability,
            similarity_boost: voice.similarity_boost,
            speed: voice.speed,
        }
    }
}

impl NarrationConfig {
    pub fn voice(&self) -> VoiceParameters {
        VoiceParameters {
            voice_id: self.voice_id.clone(),
            model_id: self.model_id.clone(),
            stability: self.stability,
            similarity_boost: self.similarity_boost,
            speed: self.speed,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values. Values are validated after parsing.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SightlineError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                SightlineError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML or out-of-range values are still errors.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(SightlineError::ConfigFileNotFound { .. }) => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Reject values the services or the detection filter cannot use
    pub fn validate(&self) -> Result<()> {
        let unit = |key: &str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(SightlineError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: format!("{value} is outside 0.0..=1.0"),
                })
            }
        };

        unit("detection.min_confidence", self.detection.min_confidence)?;
        unit("narration.stability", self.narration.stability)?;
        unit("narration.similarity_boost", self.narration.similarity_boost)?;

        if !(0.7..=1.2).contains(&self.narration.speed) {
            return Err(SightlineError::ConfigInvalidValue {
                key: "narration.speed".to_string(),
                message: format!("{} is outside 0.7..=1.2", self.narration.speed),
            });
        }
        if !(0.0..=2.0).contains(&self.description.temperature) {
            return Err(SightlineError::ConfigInvalidValue {
                key: "description.temperature".to_string(),
                message: format!("{} is outside 0.0..=2.0", self.description.temperature),
            });
        }
        if self.description.prompt.trim().is_empty() {
            return Err(SightlineError::ConfigInvalidValue {
                key: "description.prompt".to_string(),
                message: "prompt must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SIGHTLINE_GEMINI_API_KEY → credentials.gemini_api_key
    /// - SIGHTLINE_ELEVENLABS_API_KEY → credentials.elevenlabs_api_key
    /// - SIGHTLINE_MUTED → narration.muted (1/true/yes, 0/false/no)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("SIGHTLINE_GEMINI_API_KEY")
            && !key.is_empty()
        {
            self.credentials.gemini_api_key = key;
        }

        if let Ok(key) = std::env::var("SIGHTLINE_ELEVENLABS_API_KEY")
            && !key.is_empty()
        {
            self.credentials.elevenlabs_api_key = key;
        }

        if let Ok(muted) = std::env::var("SIGHTLINE_MUTED")
            && !muted.is_empty()
        {
            match parse_flag(&muted) {
                Some(flag) => self.narration.muted = flag,
                None => log::warn!("Ignoring SIGHTLINE_MUTED={muted:?}: expected true or false"),
            }
        }

        self
    }

    /// Runtime settings handed to the pipeline components
    pub fn to_settings(&self) -> Settings {
        Settings::new(
            &self.credentials.gemini_api_key,
            &self.credentials.elevenlabs_api_key,
        )
        .with_muted(self.narration.muted)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            frame_interval: Duration::from_millis(self.detection.frame_interval_ms),
            min_confidence: self.detection.min_confidence,
            auto_describe: Duration::from_secs(self.description.auto_interval_secs),
            prompt: self.description.prompt.clone(),
        }
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/sightline/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            SightlineError::Other("Could not determine config directory".to_string())
        })?;
        Ok(dir.join("sightline").join("config.toml"))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
