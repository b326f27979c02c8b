//! Frame model.
//!
//! - `Frame`: pixel grid produced by a source, tagged with its wall-clock capture time.
//! - `GrayFrame`: single-channel derivative handed to detector backends.
//!
//! A `Frame` is owned by the loop iteration that read it. The persisted copy is always the
//! unannotated original; annotation happens on a clone reserved for display.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

use crate::detect::BoundingBox;

/// Rectangle color used for detection markers.
pub const MARKER_COLOR: [u8; 3] = [0, 255, 0];

/// Rectangle stroke width in pixels.
pub const MARKER_THICKNESS: u32 = 2;

/// Captured frame. Pixels are stored row-major, `channels` bytes per pixel (1 = gray, 3 = RGB).
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    wall_time: DateTime<Local>,
}

impl Frame {
    /// Build an RGB frame stamped with the current time.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Self::new(data, width, height, 3)
    }

    /// Build a single-channel frame stamped with the current time.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Self::new(data, width, height, 1)
    }

    fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self> {
        let expected = expected_len(width, height, channels)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            wall_time: Local::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per pixel: 1 for gray, 3 for RGB.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Wall-clock capture time, used only for naming persisted snapshots.
    pub fn wall_time(&self) -> DateTime<Local> {
        self.wall_time
    }

    /// Derive the detection-ready single-channel representation (BT.601 luma).
    pub fn to_gray(&self) -> GrayFrame {
        let data = match self.channels {
            1 => self.data.clone(),
            _ => self
                .data
                .chunks_exact(self.channels as usize)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
        };
        GrayFrame {
            data,
            width: self.width,
            height: self.height,
        }
    }

    /// Draw a hollow rectangle outline for `bbox`, clipped to the frame.
    pub fn draw_box(&mut self, bbox: &BoundingBox, color: [u8; 3], thickness: u32) {
        if self.width == 0 || self.height == 0 || bbox.x >= self.width || bbox.y >= self.height {
            return;
        }
        let x0 = bbox.x;
        let y0 = bbox.y;
        let x1 = bbox.x.saturating_add(bbox.width).min(self.width - 1);
        let y1 = bbox.y.saturating_add(bbox.height).min(self.height - 1);

        for inset in 0..thickness {
            let (left, top) = (x0 + inset, y0 + inset);
            let (right, bottom) = (x1.saturating_sub(inset), y1.saturating_sub(inset));
            if left > right || top > bottom {
                break;
            }
            for x in left..=right {
                self.put_pixel(x, top, color);
                self.put_pixel(x, bottom, color);
            }
            for y in top..=bottom {
                self.put_pixel(left, y, color);
                self.put_pixel(right, y, color);
            }
        }
    }

    /// Scale down to fit `max_width x max_height`, keeping aspect ratio.
    ///
    /// Frames already within bounds are returned unchanged.
    pub fn scaled_to_fit(&self, max_width: u32, max_height: u32) -> Result<Frame> {
        if self.width <= max_width && self.height <= max_height {
            return Ok(self.clone());
        }
        let scale = f64::min(
            max_width as f64 / self.width as f64,
            max_height as f64 / self.height as f64,
        );
        let width = ((self.width as f64 * scale).round() as u32).max(1);
        let height = ((self.height as f64 * scale).round() as u32).max(1);

        let data = match self.channels {
            1 => {
                let img = GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| anyhow!("gray frame buffer does not match dimensions"))?;
                imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
            }
            _ => {
                let img = self.to_rgb_image()?;
                imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
            }
        };

        Ok(Frame {
            data,
            width,
            height,
            channels: self.channels,
            wall_time: self.wall_time,
        })
    }

    /// Convert to an `image` RGB buffer for encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let data = match self.channels {
            1 => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            _ => self.data.clone(),
        };
        RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| anyhow!("frame buffer does not match dimensions"))
    }

    fn put_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        let channels = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        if channels == 1 {
            self.data[offset] = luma(color[0], color[1], color[2]);
        } else {
            self.data[offset..offset + 3].copy_from_slice(&color);
        }
    }
}

/// Single-channel frame handed to detector backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = expected_len(width, height, 1)?;
        if data.len() != expected {
            return Err(anyhow!(
                "gray frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

fn expected_len(width: u32, height: u32, channels: u8) -> Result<usize> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(channels as usize))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    Ok(len)
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299_f32 * r as f32 + 0.587_f32 * g as f32 + 0.114_f32 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}
