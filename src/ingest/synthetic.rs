//! Synthetic frame source (`stub://`).
//!
//! Renders a dark, noisy background with a bright square that drifts across the scene.
//! The square is visible for `PRESENT_FRAMES` frames, then hidden for `ABSENT_FRAMES`
//! frames, so a run exercises appearance, continuous presence and disappearance.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceSettings, SourceStats};
use crate::frame::Frame;

const PRESENT_FRAMES: u64 = 300;
const ABSENT_FRAMES: u64 = 100;
const SQUARE_SIZE: u32 = 64;
const SQUARE_LUMA: u8 = 230;
const NOISE_MAX: u8 = 60;

pub struct SyntheticSource {
    settings: SourceSettings,
    connected: bool,
    frame_count: u64,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            settings,
            connected: false,
            frame_count: 0,
            next_due: None,
        }
    }

    /// Whether frame number `n` (0-based) shows the square.
    pub fn square_visible(n: u64) -> bool {
        n % (PRESENT_FRAMES + ABSENT_FRAMES) < PRESENT_FRAMES
    }

    fn pace(&mut self) {
        if self.settings.target_fps == 0 {
            return;
        }
        let period = Duration::from_secs(1) / self.settings.target_fps;
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + period);
    }

    fn render(&self, n: u64) -> Vec<u8> {
        let (width, height) = (self.settings.width as usize, self.settings.height as usize);
        let square = SQUARE_SIZE as usize;
        let mut rng = rand::thread_rng();
        let mut pixels: Vec<u8> = (0..width * height * 3)
            .map(|_| rng.gen_range(0..=NOISE_MAX))
            .collect();

        if Self::square_visible(n) && width >= square && height >= square {
            let span = (width - square) as u64 + 1;
            let x0 = (n * 4 % span) as usize;
            let y0 = (height - square) / 2;
            for row in pixels.chunks_exact_mut(width * 3).skip(y0).take(square) {
                row[x0 * 3..(x0 + square) * 3].fill(SQUARE_LUMA);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn url(&self) -> &str {
        &self.settings.url
    }

    fn open(&mut self) -> Result<()> {
        self.settings.validate()?;
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{} @ {} fps)",
            self.settings.url,
            self.settings.width,
            self.settings.height,
            self.settings.target_fps
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected"));
        }
        self.pace();
        let pixels = self.render(self.frame_count);
        self.frame_count += 1;
        Frame::from_rgb(pixels, self.settings.width, self.settings.height)
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            read_failures: 0,
            url: self.settings.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{CpuBackend, DetectorBackend};

    fn fast_settings() -> SourceSettings {
        SourceSettings {
            url: "stub://test".to_string(),
            target_fps: 0,
            width: 160,
            height: 120,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(fast_settings());
        assert!(source.read().is_err(), "read before open must fail");
        source.open()?;

        let frame = source.read()?;
        assert_eq!((frame.width(), frame.height(), frame.channels()), (160, 120, 3));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn square_is_detectable_and_cycles() -> Result<()> {
        let mut source = SyntheticSource::new(fast_settings());
        source.open()?;
        let mut backend = CpuBackend::default();

        let frame = source.read()?;
        assert_eq!(backend.detect(&frame.to_gray())?.count(), 1);

        assert!(SyntheticSource::square_visible(PRESENT_FRAMES - 1));
        assert!(!SyntheticSource::square_visible(PRESENT_FRAMES));
        assert!(SyntheticSource::square_visible(PRESENT_FRAMES + ABSENT_FRAMES));
        Ok(())
    }

    #[test]
    fn oversized_source_fails_to_open() {
        let mut source = SyntheticSource::new(SourceSettings {
            width: 100_000,
            height: 100_000,
            ..fast_settings()
        });
        assert!(source.open().is_err());
        assert!(!source.is_healthy());
    }

    #[test]
    fn zero_sized_source_fails_to_open() {
        let mut source = SyntheticSource::new(SourceSettings {
            width: 0,
            ..fast_settings()
        });
        assert!(source.open().is_err());
    }
}
