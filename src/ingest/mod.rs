//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Synthetic scene (`stub://<name>`), for demos and tests
//! - Image sequence directory (`dir://<path>`), replayed in a loop
//! - USB/V4L2 devices (`/dev/videoN` or `v4l2://<path>`, feature: ingest-v4l2)
//!
//! Sources are pull-based: `read` blocks until a frame is ready or the device reports a
//! failure. The loop treats read failures as transient; only `open` failures are fatal.

pub mod file;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use file::ImageDirSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Largest accepted frame width or height.
pub const MAX_FRAME_DIMENSION: u32 = 8192;

/// Source settings shared by all backends.
#[derive(Clone, Debug)]
pub struct SourceSettings {
    pub url: String,
    /// Target frame rate. Synthetic sources pace themselves to it; devices request it.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl SourceSettings {
    /// Reject empty urls and frame sizes outside `1..=MAX_FRAME_DIMENSION`.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        let in_range = |v: u32| (1..=MAX_FRAME_DIMENSION).contains(&v);
        if !in_range(self.width) || !in_range(self.height) {
            return Err(anyhow!(
                "source frame size {}x{} outside 1..={}",
                self.width,
                self.height,
                MAX_FRAME_DIMENSION
            ));
        }
        Ok(())
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: "stub://camera0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub read_failures: u64,
    pub url: String,
}

/// A live video source producing frames on demand.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn url(&self) -> &str;

    /// Acquire the underlying device. Failure here is a startup error.
    fn open(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn read(&mut self) -> Result<Frame>;

    /// Release the underlying device.
    fn close(&mut self);

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn url(&self) -> &str {
        (**self).url()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn read(&mut self) -> Result<Frame> {
        (**self).read()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// An opened source. The device is released exactly once, when the guard is dropped,
/// including during unwinding.
pub struct SourceGuard<S: FrameSource> {
    source: S,
}

impl<S: FrameSource> SourceGuard<S> {
    /// Open `source`. Nothing needs releasing if this fails.
    pub fn open(mut source: S) -> Result<Self> {
        source.open()?;
        log::info!("frame source opened: {}", source.url());
        Ok(Self { source })
    }

    pub fn read(&mut self) -> Result<Frame> {
        self.source.read()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: FrameSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.source.close();
        log::info!("frame source released: {}", self.source.url());
    }
}

/// Build (but do not open) the source named by `settings.url`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    if let Some(path) = url.strip_prefix("dir://") {
        return Ok(Box::new(ImageDirSource::new(path)));
    }
    if url.starts_with("v4l2://") || url.starts_with("/dev/video") {
        #[cfg(feature = "ingest-v4l2")]
        {
            let mut settings = settings.clone();
            settings.url = url.trim_start_matches("v4l2://").to_string();
            return Ok(Box::new(V4l2Source::new(settings)));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            return Err(anyhow!(
                "device capture requires the ingest-v4l2 feature ({})",
                url
            ));
        }
    }
    Err(anyhow!("unsupported source url '{}'", url))
}
