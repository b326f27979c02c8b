use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, DetectionResult};
use crate::frame::GrayFrame;

pub const DEFAULT_THRESHOLD: u8 = 200;
pub const DEFAULT_MIN_SIZE: (u32, u32) = (30, 30);

/// CPU backend: finds bright connected regions.
///
/// Pixels at or above `threshold` are foreground. Each 4-connected foreground component whose
/// bounding box is at least `min_size` becomes one detection, in raster order of discovery.
#[derive(Clone, Debug)]
pub struct CpuBackend {
    threshold: u8,
    min_size: (u32, u32),
    visited: Vec<bool>,
    stack: Vec<usize>,
}

impl CpuBackend {
    pub fn new(threshold: u8, min_size: (u32, u32)) -> Self {
        Self {
            threshold,
            min_size,
            visited: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn flood(&mut self, pixels: &[u8], width: usize, height: usize, seed: usize) -> BoundingBox {
        let (mut min_x, mut min_y) = (seed % width, seed / width);
        let (mut max_x, mut max_y) = (min_x, min_y);

        self.visited[seed] = true;
        self.stack.push(seed);
        while let Some(idx) = self.stack.pop() {
            let (x, y) = (idx % width, idx / width);
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);

            let neighbors = [
                (x > 0).then(|| idx - 1),
                (x + 1 < width).then(|| idx + 1),
                (y > 0).then(|| idx - width),
                (y + 1 < height).then(|| idx + width),
            ];
            for n in neighbors.into_iter().flatten() {
                if !self.visited[n] && pixels[n] >= self.threshold {
                    self.visited[n] = true;
                    self.stack.push(n);
                }
            }
        }

        BoundingBox::new(
            min_x as u32,
            min_y as u32,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_MIN_SIZE)
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, frame: &GrayFrame) -> Result<DetectionResult> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let pixels = frame.pixels();

        self.visited.clear();
        self.visited.resize(pixels.len(), false);

        let mut boxes = Vec::new();
        for idx in 0..pixels.len() {
            if self.visited[idx] || pixels[idx] < self.threshold {
                continue;
            }
            let bbox = self.flood(pixels, width, height, idx);
            if bbox.width >= self.min_size.0 && bbox.height >= self.min_size.1 {
                boxes.push(bbox);
            }
        }

        Ok(DetectionResult::new(boxes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_squares(width: u32, height: u32, squares: &[BoundingBox]) -> GrayFrame {
        let mut data = vec![10u8; (width * height) as usize];
        for sq in squares {
            for y in sq.y..sq.y + sq.height {
                for x in sq.x..sq.x + sq.width {
                    data[(y * width + x) as usize] = 250;
                }
            }
        }
        GrayFrame::new(data, width, height).unwrap()
    }

    #[test]
    fn cpu_backend_finds_bright_regions() -> Result<()> {
        let squares = [BoundingBox::new(5, 5, 40, 40), BoundingBox::new(60, 50, 32, 30)];
        let frame = frame_with_squares(100, 100, &squares);
        let mut backend = CpuBackend::default();

        let result = backend.detect(&frame)?;
        assert_eq!(result.boxes, squares.to_vec());
        Ok(())
    }

    #[test]
    fn cpu_backend_ignores_small_regions() -> Result<()> {
        let frame = frame_with_squares(64, 64, &[BoundingBox::new(1, 1, 10, 10)]);
        let mut backend = CpuBackend::default();
        assert!(backend.detect(&frame)?.is_empty());

        let mut permissive = CpuBackend::new(200, (5, 5));
        assert_eq!(permissive.detect(&frame)?.count(), 1);
        Ok(())
    }

    #[test]
    fn cpu_backend_is_stable_across_calls() -> Result<()> {
        let frame = frame_with_squares(64, 64, &[BoundingBox::new(0, 0, 40, 40)]);
        let mut backend = CpuBackend::default();
        let first = backend.detect(&frame)?;
        let second = backend.detect(&frame)?;
        assert_eq!(first, second);
        Ok(())
    }
}
