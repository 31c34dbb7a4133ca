//! Error types for sightline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SightlineError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Pipeline errors
    #[error("{component} is not ready")]
    NotReady { component: String },

    #[error("Missing or rejected API key for {service}")]
    Unauthenticated { service: String },

    #[error("{message}")]
    RateLimited { message: String },

    #[error("Network request failed: {message}")]
    NetworkFailure { message: String },

    #[error("Audio playback failed: {message}")]
    PlaybackFailure { message: String },

    // Frame and inference errors
    #[error("No frame available: {message}")]
    FrameUnavailable { message: String },

    #[error("Object detection failed: {message}")]
    Detection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of [`SightlineError`], carried in published error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotReady,
    Unauthenticated,
    RateLimited,
    NetworkFailure,
    PlaybackFailure,
    FrameUnavailable,
    Detection,
    Configuration,
    Other,
}

impl SightlineError {
    /// Classify this error for event reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SightlineError::ConfigFileNotFound { .. }
            | SightlineError::ConfigParse { .. }
            | SightlineError::ConfigInvalidValue { .. }
            | SightlineError::Config(_) => ErrorKind::Configuration,
            SightlineError::NotReady { .. } => ErrorKind::NotReady,
            SightlineError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            SightlineError::RateLimited { .. } => ErrorKind::RateLimited,
            SightlineError::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            SightlineError::PlaybackFailure { .. } => ErrorKind::PlaybackFailure,
            SightlineError::FrameUnavailable { .. } => ErrorKind::FrameUnavailable,
            SightlineError::Detection { .. } => ErrorKind::Detection,
            SightlineError::Io(_) | SightlineError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether repeating the operation without changing configuration can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Unauthenticated | ErrorKind::Configuration
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SightlineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = SightlineError::ConfigFileNotFound {
            path: "/path/to/config.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/config.toml"
        );
    }

    #[test]
    fn test_not_ready_display() {
        let error = SightlineError::NotReady {
            component: "Detection engine".to_string(),
        };
        assert_eq!(error.to_string(), "Detection engine is not ready");
    }

    #[test]
    fn test_unauthenticated_display() {
        let error = SightlineError::Unauthenticated {
            service: "Gemini".to_string(),
        };
        assert_eq!(error.to_string(), "Missing or rejected API key for Gemini");
    }

    #[test]
    fn test_rate_limited_display_is_the_guidance_message() {
        let error = SightlineError::RateLimited {
            message: "Rate limit exceeded. Please wait a moment.".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Rate limit exceeded. Please wait a moment."
        );
    }

    #[test]
    fn test_network_failure_display() {
        let error = SightlineError::NetworkFailure {
            message: "Gemini API error: 500".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Network request failed: Gemini API error: 500"
        );
    }

    #[test]
    fn test_playback_failure_display() {
        let error = SightlineError::PlaybackFailure {
            message: "device unplugged".to_string(),
        };
        assert_eq!(error.to_string(), "Audio playback failed: device unplugged");
    }

    #[test]
    fn test_kind_classification() {
        let cases = vec![
            (
                SightlineError::NotReady {
                    component: "x".to_string(),
                },
                ErrorKind::NotReady,
            ),
            (
                SightlineError::Unauthenticated {
                    service: "x".to_string(),
                },
                ErrorKind::Unauthenticated,
            ),
            (
                SightlineError::RateLimited {
                    message: "x".to_string(),
                },
                ErrorKind::RateLimited,
            ),
            (
                SightlineError::NetworkFailure {
                    message: "x".to_string(),
                },
                ErrorKind::NetworkFailure,
            ),
            (
                SightlineError::PlaybackFailure {
                    message: "x".to_string(),
                },
                ErrorKind::PlaybackFailure,
            ),
            (
                SightlineError::ConfigParse {
                    message: "x".to_string(),
                },
                ErrorKind::Configuration,
            ),
            (SightlineError::Other("x".to_string()), ErrorKind::Other),
        ];

        for (error, expected) in cases {
            assert_eq!(error.kind(), expected, "wrong kind for {:?}", error);
        }
    }

    #[test]
    fn test_retryable() {
        assert!(
            SightlineError::NetworkFailure {
                message: "timeout".to_string()
            }
            .is_retryable()
        );
        assert!(
            SightlineError::RateLimited {
                message: "slow down".to_string()
            }
            .is_retryable()
        );
        assert!(
            !SightlineError::Unauthenticated {
                service: "ElevenLabs".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: SightlineError = io_error.into();
        assert!(error.to_string().contains("file not found"));
        assert_eq!(error.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: SightlineError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SightlineError>();
        assert_sync::<SightlineError>();
    }
}
