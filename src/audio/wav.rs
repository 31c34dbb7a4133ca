//! WAV file output for headless runs.

use crate::audio::sink::{AudioClip, AudioSink, Playback};
use crate::error::{Result, SightlineError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Audio sink that writes every clip to `narration-NNN.wav` in a directory.
///
/// Writing is synchronous, so each playback completes as soon as play() returns.
#[derive(Debug)]
pub struct WavFileSink {
    dir: PathBuf,
    written: AtomicU32,
}

impl WavFileSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: AtomicU32::new(0),
        })
    }

    /// Number of files written so far.
    pub fn written(&self) -> u32 {
        self.written.load(Ordering::SeqCst)
    }

    fn write_clip(&self, path: &Path, clip: &AudioClip) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: clip.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let map_err = |e: hound::Error| SightlineError::PlaybackFailure {
            message: format!("Failed to write {}: {}", path.display(), e),
        };

        let mut writer = hound::WavWriter::create(path, spec).map_err(map_err)?;
        for sample in clip.samples() {
            writer.write_sample(sample).map_err(map_err)?;
        }
        writer.finalize().map_err(map_err)
    }
}

impl AudioSink for WavFileSink {
    fn play(&self, clip: AudioClip) -> Result<Playback> {
        let index = self.written.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.dir.join(format!("narration-{:03}.wav", index));
        self.write_clip(&path, &clip)?;
        log::info!("Wrote narration to {}", path.display());
        Ok(Playback::finished(Ok(())))
    }

    fn stop(&self) {}

    fn name(&self) -> &str {
        "wav-file"
    }
}
