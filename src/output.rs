//! Terminal rendering of pipeline events.

use crate::detect::DetectionSet;
use crate::pipeline::events::PipelineEvent;
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Clear the current terminal line (replaces the detection status line)
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// Summarize a detection set as `person 92%, chair 61%`.
pub fn format_detections(set: &DetectionSet) -> String {
    if set.is_empty() {
        return format!("{DIM}no objects{RESET}");
    }
    set.detections()
        .iter()
        .map(|d| format!("{} {:.0}%", d.label, d.confidence * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One display line for an event, without trailing newline.
pub fn format_event(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::Detections { detections } => format_detections(detections),
        PipelineEvent::Description { text, .. } => format!("{GREEN}{text}{RESET}"),
        PipelineEvent::NarrationStarted { text } => format!("{DIM}speaking: {text}{RESET}"),
        PipelineEvent::NarrationFinished { .. } => format!("{DIM}done speaking{RESET}"),
        PipelineEvent::Error {
            origin,
            kind,
            message,
        } => {
            let color = if kind_is_warning(*kind) { YELLOW } else { RED };
            format!("{color}{origin} error:{RESET} {message}")
        }
    }
}

fn kind_is_warning(kind: crate::error::ErrorKind) -> bool {
    matches!(kind, crate::error::ErrorKind::RateLimited)
}

/// Render one event to stderr. Detection updates overwrite a single status line.
pub fn render_event(event: &PipelineEvent) {
    let line = format_event(event);
    match event {
        PipelineEvent::Detections { .. } => {
            eprint!("\r\x1b[2K{line}");
            io::stderr().flush().ok();
        }
        _ => {
            clear_line();
            eprintln!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use crate::error::ErrorKind;
    use crate::pipeline::error::Origin;

    #[test]
    fn format_detections_lists_labels_with_percent() {
        let set = DetectionSet::from_raw(
            vec![
                Detection::new("person", 0.92, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
                Detection::new("chair", 0.61, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            ],
            0.5,
        );
        assert_eq!(format_detections(&set), "person 92%, chair 61%");
    }

    #[test]
    fn format_detections_empty() {
        assert!(format_detections(&DetectionSet::empty()).contains("no objects"));
    }

    #[test]
    fn format_error_names_origin() {
        let line = format_event(&PipelineEvent::Error {
            origin: Origin::Narration,
            kind: ErrorKind::PlaybackFailure,
            message: "device lost".to_string(),
        });
        assert!(line.contains("narration error:"));
        assert!(line.contains("device lost"));
        assert!(line.contains(RED));
    }

    #[test]
    fn format_rate_limit_is_warning_colored() {
        let line = format_event(&PipelineEvent::Error {
            origin: Origin::Description,
            kind: ErrorKind::RateLimited,
            message: "slow down".to_string(),
        });
        assert!(line.contains(YELLOW));
    }

    #[test]
    fn format_description_contains_text() {
        let line = format_event(&PipelineEvent::Description {
            text: "A door ahead.".to_string(),
            captured_at_ms: 0,
        });
        assert!(line.contains("A door ahead."));
    }
}
