//! Image sequence frame source (`dir://<path>`).
//!
//! Replays the PNG/JPEG files of a local directory in file-name order, wrapping around at
//! the end. A file that fails to decode is a transient read failure; the next read moves on
//! to the following file.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ImageDirSource {
    url: String,
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frames_captured: u64,
    read_failures: u64,
}

impl ImageDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            url: format!("dir://{}", dir.display()),
            dir,
            files: Vec::new(),
            cursor: 0,
            frames_captured: 0,
            read_failures: 0,
        }
    }

    fn scan(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("read image directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ImageDirSource {
    fn url(&self) -> &str {
        &self.url
    }

    fn open(&mut self) -> Result<()> {
        let files = self.scan()?;
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        log::info!(
            "ImageDirSource: {} images in {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        if self.files.is_empty() {
            return Err(anyhow!("image source not opened"));
        }
        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();

        let decoded = image::open(path).with_context(|| format!("decode {}", path.display()));
        match decoded {
            Ok(image) => {
                let rgb = image.into_rgb8();
                let (width, height) = rgb.dimensions();
                self.frames_captured += 1;
                Frame::from_rgb(rgb.into_raw(), width, height)
            }
            Err(e) => {
                self.read_failures += 1;
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            read_failures: self.read_failures,
            url: self.url.clone(),
        }
    }
}
