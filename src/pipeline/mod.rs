//! Pipeline plumbing: scheduling, events, error reporting and the composition root.

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod scheduler;

pub use error::{CollectingReporter, ErrorReporter, EventReporter, LogReporter, Origin};
pub use events::{EventSender, PipelineEvent, event_channel};
pub use orchestrator::{Pipeline, PipelineConfig, PipelineServices};
pub use scheduler::{CancelToken, FrameTicker, IntervalTicker, RepeatingTask, run_self_paced};
