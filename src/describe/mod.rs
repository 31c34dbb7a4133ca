//! Scene description: snapshot a frame, ask a vision model what it shows.

#[cfg(feature = "http")]
pub mod gemini;
pub mod requester;
pub mod service;

#[cfg(feature = "http")]
pub use gemini::GeminiClient;
pub use requester::{DescriptionRequester, DescriptionResult, RequestPhase, TriggerOutcome};
pub use service::{DescriptionRequest, DescriptionService, MockDescriptionService, MockReply};
