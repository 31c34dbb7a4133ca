//! sightline command-line entry point.
//!
//! Describes still images, reads text aloud and runs the pipeline on a timer.

use anyhow::{Context, Result, bail};
use clap::Parser;
use sightline::audio::{AudioSink, NullAudioSink, WavFileSink};
use sightline::cli::{Cli, Commands};
use sightline::config::Config;
use sightline::describe::{GeminiClient, TriggerOutcome};
use sightline::frame::StillImageSource;
use sightline::narrate::{DropReason, ElevenLabsClient, SubmitOutcome};
use sightline::output::render_event;
use sightline::pipeline::{
    EventSender, Pipeline, PipelineEvent, PipelineServices, event_channel,
};
use sightline::settings::Settings;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    log::info!("sightline {}", sightline::version_string());

    let config = load_config(cli.config.as_deref())?;
    let settings = Arc::new(config.to_settings());
    if cli.mute {
        settings.set_muted(true);
    }

    let (events, rx) = event_channel(sightline::defaults::EVENT_BUFFER);
    let printer = spawn_event_printer(rx, cli.quiet);
    let wav_dir = cli.wav_dir.as_deref();

    let result = match cli.command {
        Commands::Describe { image, speak } => {
            if !speak {
                settings.set_muted(true);
            }
            let pipeline = build_pipeline(&config, settings, wav_dir, events, Duration::ZERO)?;
            run_describe(&pipeline, &image).await
        }
        Commands::Speak { text } => {
            let pipeline = build_pipeline(&config, settings, wav_dir, events, Duration::ZERO)?;
            run_speak(&pipeline, &text).await
        }
        Commands::Watch {
            image,
            interval,
            count: Some(count),
        } => {
            let pipeline = build_pipeline(&config, settings, wav_dir, events, Duration::ZERO)?;
            run_watch_count(&pipeline, &image, interval, count).await
        }
        Commands::Watch {
            image,
            interval,
            count: None,
        } => {
            let pipeline = build_pipeline(&config, settings, wav_dir, events, interval)?;
            run_watch(&pipeline, &image).await
        }
    };

    wait_for_printer(printer);
    result
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        let default_path = Config::default_path()?;
        Config::load_or_default(&default_path)?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

/// Print events until every sender is gone. Descriptions go to stdout so they
/// can be piped; everything else is status output on stderr.
fn spawn_event_printer(
    rx: crossbeam_channel::Receiver<PipelineEvent>,
    quiet: bool,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in rx.iter() {
            match &event {
                PipelineEvent::Description { text, .. } => println!("{text}"),
                _ if quiet => {}
                _ => render_event(&event),
            }
        }
    })
}

/// Give the printer up to 1s to drain; in-flight requests may still hold senders.
fn wait_for_printer(printer: JoinHandle<()>) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while !printer.is_finished() {
        if Instant::now() >= deadline {
            // Dropping the handle detaches the thread; it dies with the process
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    if printer.join().is_err() {
        eprintln!("sightline: event printer panicked");
    }
}

fn build_sink(settings: &Settings, wav_dir: Option<&Path>) -> Result<Arc<dyn AudioSink>> {
    if let Some(dir) = wav_dir {
        return Ok(Arc::new(WavFileSink::new(dir)?));
    }
    // Only open the speakers when something may be spoken
    if settings.is_muted() {
        return Ok(Arc::new(NullAudioSink));
    }

    #[cfg(feature = "cpal-audio")]
    {
        let sink = sightline::audio::CpalAudioSink::new()
            .context("Cannot open audio output; use --wav-dir to write files instead")?;
        Ok(Arc::new(sink))
    }

    #[cfg(not(feature = "cpal-audio"))]
    {
        bail!("Built without speaker output; use --wav-dir to write narration to files")
    }
}

fn build_pipeline(
    config: &Config,
    settings: Arc<Settings>,
    wav_dir: Option<&Path>,
    events: EventSender,
    auto_describe: Duration,
) -> Result<Pipeline> {
    let description = GeminiClient::new()
        .with_base_url(&config.description.base_url)
        .with_model(&config.description.model)
        .with_generation(
            config.description.temperature,
            config.description.max_output_tokens,
        );
    let narration = ElevenLabsClient::new()
        .with_base_url(&config.narration.base_url)
        .with_voice(config.narration.voice());
    let audio = build_sink(&settings, wav_dir)?;

    let mut pipeline_config = config.pipeline_config();
    pipeline_config.auto_describe = auto_describe;

    log::info!("No object detection model configured; running description and narration only");
    Ok(Pipeline::new(
        PipelineServices {
            detection: None,
            description: Arc::new(description),
            narration: Arc::new(narration),
            audio,
        },
        settings,
        pipeline_config,
        events,
    ))
}

fn missing_gemini_key() -> anyhow::Error {
    anyhow::anyhow!(
        "No Gemini API key. Set SIGHTLINE_GEMINI_API_KEY or credentials.gemini_api_key in the config file"
    )
}

fn open_source(image: &Path) -> Result<Arc<StillImageSource>> {
    let source = StillImageSource::open(image)
        .with_context(|| format!("Failed to open image {}", image.display()))?;
    Ok(Arc::new(source))
}

async fn run_describe(pipeline: &Pipeline, image: &Path) -> Result<()> {
    if pipeline.settings().description_key().is_none() {
        return Err(missing_gemini_key());
    }
    pipeline.start(open_source(image)?);

    let outcome = pipeline.describe_now().await;
    pipeline.player().wait_idle().await;
    pipeline.stop();

    match outcome? {
        TriggerOutcome::Published(_) => Ok(()),
        _ => bail!("No description returned"),
    }
}

async fn run_speak(pipeline: &Pipeline, text: &str) -> Result<()> {
    match pipeline.speak(text) {
        SubmitOutcome::Dropped(DropReason::MissingCredential) => bail!(
            "No ElevenLabs API key. Set SIGHTLINE_ELEVENLABS_API_KEY or credentials.elevenlabs_api_key in the config file"
        ),
        SubmitOutcome::Dropped(DropReason::Muted) => eprintln!("sightline: narration is muted"),
        SubmitOutcome::Dropped(DropReason::EmptyText) => bail!("Nothing to say"),
        _ => pipeline.player().wait_idle().await,
    }
    Ok(())
}

/// Describe `count` times, `interval` apart, then wait for narration to finish.
async fn run_watch_count(
    pipeline: &Pipeline,
    image: &Path,
    interval: Duration,
    count: u32,
) -> Result<()> {
    if pipeline.settings().description_key().is_none() {
        return Err(missing_gemini_key());
    }
    pipeline.start(open_source(image)?);

    for attempt in 0..count {
        if attempt > 0 {
            tokio::time::sleep(interval).await;
        }
        match pipeline.describe_now().await {
            Ok(_) => {}
            Err(e) if !e.is_retryable() => return Err(e.into()),
            // Reported through the event stream
            Err(e) => log::debug!("description attempt {} failed: {e}", attempt + 1),
        }
    }

    pipeline.player().wait_idle().await;
    pipeline.stop();
    Ok(())
}

/// Run the pipeline timer until Ctrl+C.
async fn run_watch(pipeline: &Pipeline, image: &Path) -> Result<()> {
    if pipeline.settings().description_key().is_none() {
        return Err(missing_gemini_key());
    }
    pipeline.start(open_source(image)?);
    eprintln!("Watching {} (Ctrl+C to stop)", image.display());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    pipeline.stop();
    Ok(())
}
