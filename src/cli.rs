//! Command-line interface for sightline
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Scene narration for still images and live pipelines
#[derive(Parser, Debug)]
#[command(
    name = "sightline",
    version,
    about = "Describe what a camera sees and read it aloud"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress event output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info logs, -vv: debug logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Do not narrate anything
    #[arg(long, global = true)]
    pub mute: bool,

    /// Write narration to numbered WAV files in DIR instead of the speakers
    #[arg(long, global = true, value_name = "DIR")]
    pub wav_dir: Option<PathBuf>,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`), and compound (`1m30s`). Zero is rejected.
fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let duration = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(duration)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Describe a still image once
    Describe {
        /// Image file (JPEG or PNG)
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Also read the description aloud
        #[arg(long)]
        speak: bool,
    },

    /// Read text aloud
    Speak {
        /// Text to narrate
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Run the pipeline against an image, describing it on a timer
    Watch {
        /// Image file used as the frame source
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Time between descriptions. Examples: 10s, 1m, 1m30s
        #[arg(long, short = 'i', value_name = "DURATION", default_value = "10s", value_parser = parse_interval)]
        interval: Duration,

        /// Stop after this many description attempts (default: run until Ctrl+C)
        #[arg(long, short = 'n', value_name = "N")]
        count: Option<u32>,
    },
}
