//! Frame source abstraction.
//!
//! The live video surface is an external collaborator. The pipeline only needs
//! two things from it: the current pixel buffer (for detection) and an encoded
//! still (for description). Both are read-only.

use crate::defaults;
use crate::error::{Result, SightlineError};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::SystemTime;

/// Decoded RGB8 frame, row-major, `width * height * 3` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    data: Arc<[u8]>,
}

impl PixelBuffer {
    /// Wrap raw RGB8 pixels. Fails if the length does not match the dimensions.
    pub fn from_rgb8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(SightlineError::FrameUnavailable {
                message: format!(
                    "pixel buffer is {} bytes, expected {} for {}x{} RGB",
                    data.len(),
                    expected,
                    width,
                    height
                ),
            });
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
        })
    }

    /// Solid-color frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data: Vec<u8> = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Encode as JPEG with the given quality (1-100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let image: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(self.width, self.height, self.data.to_vec()).ok_or_else(
                || SightlineError::FrameUnavailable {
                    message: "pixel buffer does not match its dimensions".to_string(),
                },
            )?;

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .encode_image(&image)
            .map_err(|e| SightlineError::FrameUnavailable {
                message: format!("JPEG encoding failed: {e}"),
            })?;
        Ok(bytes)
    }
}

/// Encoded still image captured for one description request.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub captured_at: SystemTime,
}

impl FrameSnapshot {
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
            captured_at: SystemTime::now(),
        }
    }

    /// JPEG snapshot of `frame` at the default snapshot quality.
    pub fn jpeg_from(frame: &PixelBuffer) -> Result<Self> {
        let bytes = frame.encode_jpeg(defaults::SNAPSHOT_JPEG_QUALITY)?;
        Ok(Self::new(bytes, defaults::SNAPSHOT_MIME_TYPE))
    }
}

/// Trait for live frame providers.
///
/// This trait allows swapping implementations (real camera vs still image vs mock).
/// Both calls must be cheap enough to run several times per second.
pub trait FrameSource: Send + Sync {
    /// The frame currently on screen.
    fn current_frame(&self) -> Result<PixelBuffer>;

    /// An encoded still of the current frame.
    fn snapshot(&self) -> Result<FrameSnapshot>;
}

impl<T: FrameSource + ?Sized> FrameSource for Arc<T> {
    fn current_frame(&self) -> Result<PixelBuffer> {
        (**self).current_frame()
    }

    fn snapshot(&self) -> Result<FrameSnapshot> {
        (**self).snapshot()
    }
}

/// Frame source backed by a single image file. Every frame is the same picture.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    frame: PixelBuffer,
    jpeg: Vec<u8>,
}

impl StillImageSource {
    /// Load any JPEG or PNG file.
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path).map_err(|e| SightlineError::FrameUnavailable {
            message: format!("Failed to load image {}: {e}", path.display()),
        })?;
        Self::from_frame(PixelBuffer::from_rgb8(
            image.width(),
            image.height(),
            image.into_rgb8().into_raw(),
        )?)
    }

    pub fn from_frame(frame: PixelBuffer) -> Result<Self> {
        let jpeg = frame.encode_jpeg(defaults::SNAPSHOT_JPEG_QUALITY)?;
        Ok(Self { frame, jpeg })
    }
}

impl FrameSource for StillImageSource {
    fn current_frame(&self) -> Result<PixelBuffer> {
        Ok(self.frame.clone())
    }

    fn snapshot(&self) -> Result<FrameSnapshot> {
        Ok(FrameSnapshot::new(
            self.jpeg.clone(),
            defaults::SNAPSHOT_MIME_TYPE,
        ))
    }
}

/// Mock frame source for testing
#[derive(Debug, Default)]
pub struct MockFrameSource {
    unavailable: bool,
    frames_served: AtomicU32,
    snapshots_served: AtomicU32,
}

impl MockFrameSource {
    /// Create a new mock source serving a tiny gray frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail every call (camera off)
    pub fn with_unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn frames_served(&self) -> u32 {
        self.frames_served.load(Ordering::SeqCst)
    }

    pub fn snapshots_served(&self) -> u32 {
        self.snapshots_served.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            Err(SightlineError::FrameUnavailable {
                message: "camera is not active".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl FrameSource for MockFrameSource {
    fn current_frame(&self) -> Result<PixelBuffer> {
        self.check_available()?;
        self.frames_served.fetch_add(1, Ordering::SeqCst);
        Ok(PixelBuffer::filled(4, 4, [128, 128, 128]))
    }

    fn snapshot(&self) -> Result<FrameSnapshot> {
        self.check_available()?;
        self.snapshots_served.fetch_add(1, Ordering::SeqCst);
        Ok(FrameSnapshot::new(
            b"mock-jpeg".to_vec(),
            defaults::SNAPSHOT_MIME_TYPE,
        ))
    }
}
