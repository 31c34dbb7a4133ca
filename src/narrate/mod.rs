//! Speech narration: synthesize text and play it, newest first.

#[cfg(feature = "http")]
pub mod elevenlabs;
pub mod player;
pub mod service;

#[cfg(feature = "http")]
pub use elevenlabs::ElevenLabsClient;
pub use player::{DropReason, NarrationPlayer, NarrationRequest, PlayerState, SubmitOutcome};
pub use service::{MockNarrationService, NarrationService, VoiceParameters};
