//! sightline - real-time scene narration
//!
//! Detects objects in a live frame stream, asks a vision model for a short
//! description of the scene and reads it aloud, one clip at a time.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod describe;
pub mod detect;
pub mod error;
pub mod frame;
pub mod narrate;
pub mod output;
pub mod pipeline;
pub mod settings;

// Service seams (frames → detections / descriptions → speech → audio)
pub use audio::sink::{AudioClip, AudioSink};
pub use describe::service::DescriptionService;
pub use detect::engine::DetectionEngine;
pub use frame::FrameSource;
pub use narrate::service::NarrationService;

// Components
pub use describe::requester::{DescriptionRequester, TriggerOutcome};
pub use detect::detection_loop::DetectionLoop;
pub use narrate::player::{NarrationPlayer, SubmitOutcome};
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineServices};

// Error handling
pub use error::{ErrorKind, Result, SightlineError};

// Config
pub use config::Config;
pub use settings::Settings;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
