//! V4L2 frame source.
//!
//! Captures RGB24 frames from a local device node (e.g. /dev/video0) through memory-mapped
//! buffers. The negotiated size may differ from the requested one; frames always carry the
//! size the driver settled on.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::FourCC;

use super::{FrameSource, SourceSettings, SourceStats};
use crate::frame::Frame;

const RGB24: &[u8; 4] = b"RGB3";
const BUFFER_COUNT: u32 = 4;
/// Consecutive failed reads after which the device is reported unhealthy.
const UNHEALTHY_AFTER: u32 = 3;

pub struct V4l2Source {
    settings: SourceSettings,
    device: Option<OpenDevice>,
    frames_captured: u64,
    read_failures: u64,
    failure_streak: u32,
}

/// An open device with its buffer stream and negotiated frame size.
struct OpenDevice {
    stream: DeviceStream,
    width: u32,
    height: u32,
}

#[self_referencing]
struct DeviceStream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            settings,
            device: None,
            frames_captured: 0,
            read_failures: 0,
            failure_streak: 0,
        }
    }

    /// Request RGB24 at the configured size and return the size the driver accepted.
    fn negotiate(&self, device: &mut v4l::Device) -> Result<(u32, u32)> {
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.settings.width;
        format.height = self.settings.height;
        format.fourcc = FourCC::new(RGB24);

        let format = device
            .set_format(&format)
            .context("set v4l2 capture format")?;
        if format.fourcc != FourCC::new(RGB24) {
            return Err(anyhow!(
                "device {} offers {} instead of RGB24",
                self.settings.url,
                format.fourcc
            ));
        }

        if self.settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("{}: frame rate not applied: {}", self.settings.url, err);
            }
        }
        Ok((format.width, format.height))
    }

    fn record_failure(&mut self) {
        self.read_failures += 1;
        self.failure_streak = self.failure_streak.saturating_add(1);
    }
}

/// Build a frame from a driver buffer, ignoring trailing padding.
fn frame_from_buffer(buffer: &[u8], width: u32, height: u32) -> Result<Frame> {
    let expected = width as usize * height as usize * 3;
    let pixels = buffer
        .get(..expected)
        .ok_or_else(|| anyhow!("short v4l2 buffer: {} of {} bytes", buffer.len(), expected))?;
    Frame::from_rgb(pixels.to_vec(), width, height)
}

impl FrameSource for V4l2Source {
    fn url(&self) -> &str {
        &self.settings.url
    }

    fn open(&mut self) -> Result<()> {
        let mut device = v4l::Device::with_path(&self.settings.url)
            .with_context(|| format!("open v4l2 device {}", self.settings.url))?;
        let (width, height) = self.negotiate(&mut device)?;

        let stream = DeviceStreamTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
                    .context("map v4l2 capture buffers")
            },
        }
        .try_build()?;

        self.device = Some(OpenDevice {
            stream,
            width,
            height,
        });
        self.failure_streak = 0;
        log::info!("{}: capturing {}x{} RGB24", self.settings.url, width, height);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        let open = self.device.as_mut().context("v4l2 device not open")?;
        let (width, height) = (open.width, open.height);
        let frame = open
            .stream
            .with_stream_mut(|stream| {
                stream
                    .next()
                    .context("dequeue v4l2 buffer")
                    .and_then(|(buffer, _meta)| frame_from_buffer(buffer, width, height))
            });

        match frame {
            Ok(frame) => {
                self.frames_captured += 1;
                self.failure_streak = 0;
                Ok(frame)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            log::info!("{}: released", self.settings.url);
        }
    }

    fn is_healthy(&self) -> bool {
        self.device.is_some() && self.failure_streak < UNHEALTHY_AFTER
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            read_failures: self.read_failures,
            url: self.settings.url.clone(),
        }
    }
}
