//! Snapshot persistence.
//!
//! Snapshots are written as `screenshot_<YYYY-MM-DD>_<HH-MM-SS>.<ext>` in local time. The
//! target directory is created once when the sink is built.
//!
//! Persistence is best-effort: write failures are reported to the caller, which logs them
//! and carries on. Sinks that accept a write before performing it (`BackgroundSink`) report
//! later failures through `deferred_failures`.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::SnapwatchError;
use crate::frame::Frame;

pub const SNAPSHOT_PREFIX: &str = "screenshot_";
pub const SNAPSHOT_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Encoded image format for snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SnapshotFormat {
    #[default]
    Png,
    Jpeg,
}

impl SnapshotFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            other => Err(anyhow!("unsupported snapshot format '{}'", other)),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// A frame queued for persistence together with its capture time. Write-once.
#[derive(Debug)]
pub struct SnapshotRecord {
    pub taken_at: DateTime<Local>,
    pub frame: Frame,
}

/// Durable snapshot storage.
pub trait SnapshotSink: Send {
    /// Persist `frame`, returning the path it was (or will be) written to.
    ///
    /// For deferred sinks `Ok` means the write was accepted; a failure after that point shows
    /// up in `deferred_failures` instead.
    fn write(&mut self, frame: &Frame, taken_at: DateTime<Local>) -> Result<PathBuf>;

    /// Accepted writes that later failed.
    fn deferred_failures(&self) -> u64 {
        0
    }

    /// Wait until every accepted write has been attempted. No further writes are accepted.
    fn flush(&mut self) {}
}

/// File name for a snapshot taken at `taken_at`.
pub fn snapshot_filename(taken_at: &DateTime<Local>, format: SnapshotFormat) -> String {
    format!(
        "{}{}.{}",
        SNAPSHOT_PREFIX,
        taken_at.format(SNAPSHOT_TIME_FORMAT),
        format.extension()
    )
}

/// Recover the second-level local timestamp encoded in a snapshot file name.
pub fn parse_snapshot_filename(name: &str) -> Result<NaiveDateTime> {
    let stem = name
        .strip_prefix(SNAPSHOT_PREFIX)
        .ok_or_else(|| anyhow!("not a snapshot file name: {}", name))?;
    let stem = stem.rsplit_once('.').map(|(stem, _ext)| stem).unwrap_or(stem);
    NaiveDateTime::parse_from_str(stem, SNAPSHOT_TIME_FORMAT)
        .map_err(|e| anyhow!("invalid snapshot timestamp in {}: {}", name, e))
}

/// Writes snapshots synchronously into a directory.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    format: SnapshotFormat,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if it does not exist.
    pub fn new(dir: impl Into<PathBuf>, format: SnapshotFormat) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot directory {}", dir.display()))?;
        Ok(Self { dir, format })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, taken_at: &DateTime<Local>) -> PathBuf {
        self.dir.join(snapshot_filename(taken_at, self.format))
    }
}

impl SnapshotSink for DirectorySink {
    fn write(&mut self, frame: &Frame, taken_at: DateTime<Local>) -> Result<PathBuf> {
        let path = self.path_for(&taken_at);
        let image = frame.to_rgb_image()?;
        image
            .save_with_format(&path, self.format.image_format())
            .with_context(|| format!("write snapshot {}", path.display()))?;
        log::info!("snapshot saved: {}", path.display());
        Ok(path)
    }
}

/// Moves snapshot encoding onto a dedicated writer thread.
///
/// The queue is bounded; when it is full the snapshot is dropped and `write` returns an error
/// instead of blocking the caller. Dropping the sink drains pending writes.
pub struct BackgroundSink {
    naming: DirectorySink,
    tx: Option<SyncSender<SnapshotRecord>>,
    handle: Option<JoinHandle<()>>,
    failures: Arc<AtomicU64>,
}

impl BackgroundSink {
    pub fn spawn(sink: DirectorySink, queue_depth: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<SnapshotRecord>(queue_depth);
        let failures = Arc::new(AtomicU64::new(0));
        let writer_failures = Arc::clone(&failures);
        let mut inner = sink.clone();
        let handle = thread::Builder::new()
            .name("snapshot-writer".to_string())
            .spawn(move || {
                for record in rx {
                    if let Err(e) = inner.write(&record.frame, record.taken_at) {
                        writer_failures.fetch_add(1, Ordering::Relaxed);
                        log::warn!("{:#}", SnapwatchError::Persistence(e));
                    }
                }
            })
            .context("spawn snapshot writer thread")?;
        Ok(Self {
            naming: sink,
            tx: Some(tx),
            handle: Some(handle),
            failures,
        })
    }
}

impl SnapshotSink for BackgroundSink {
    fn write(&mut self, frame: &Frame, taken_at: DateTime<Local>) -> Result<PathBuf> {
        let path = self.naming.path_for(&taken_at);
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("snapshot writer closed"))?;
        let record = SnapshotRecord {
            taken_at,
            frame: frame.clone(),
        };
        match tx.try_send(record) {
            Ok(()) => Ok(path),
            Err(TrySendError::Full(_)) => Err(anyhow!(
                "snapshot queue full, dropped {}",
                path.display()
            )),
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("snapshot writer exited")),
        }
    }

    fn deferred_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn flush(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("snapshot writer thread panicked");
            }
        }
    }
}

impl Drop for BackgroundSink {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn test_frame() -> Frame {
        Frame::from_rgb(vec![128u8; 8 * 6 * 3], 8, 6).unwrap()
    }

    #[test]
    fn filename_round_trips_to_the_second() -> Result<()> {
        let taken_at = Local::now();
        let name = snapshot_filename(&taken_at, SnapshotFormat::Png);
        assert!(name.starts_with("screenshot_"));
        assert!(name.ends_with(".png"));

        let parsed = parse_snapshot_filename(&name)?;
        let expected = taken_at
            .naive_local()
            .with_nanosecond(0)
            .ok_or_else(|| anyhow!("truncate timestamp"))?;
        assert_eq!(parsed, expected);
        Ok(())
    }

    #[test]
    fn filename_layout_matches_pattern() {
        let taken_at = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .expect("unambiguous local time");
        assert_eq!(
            snapshot_filename(&taken_at, SnapshotFormat::Jpeg),
            "screenshot_2024-03-09_07-05-01.jpg"
        );
    }

    #[test]
    fn rejects_foreign_file_names() {
        assert!(parse_snapshot_filename("photo_2024-03-09_07-05-01.png").is_err());
        assert!(parse_snapshot_filename("screenshot_yesterday.png").is_err());
    }

    #[test]
    fn format_parsing() -> Result<()> {
        assert_eq!(SnapshotFormat::parse("PNG")?, SnapshotFormat::Png);
        assert_eq!(SnapshotFormat::parse("jpg")?, SnapshotFormat::Jpeg);
        assert!(SnapshotFormat::parse("bmp").is_err());
        Ok(())
    }

    #[test]
    fn directory_sink_creates_dir_and_writes_png() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("screenshots");
        let mut sink = DirectorySink::new(&dir, SnapshotFormat::Png)?;
        assert!(dir.is_dir());

        let path = sink.write(&test_frame(), Local::now())?;
        assert!(path.starts_with(&dir));
        let decoded = image::open(&path)?.into_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(0, 0).0, [128, 128, 128]);
        Ok(())
    }

    #[test]
    fn background_sink_flushes_on_drop() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let sink = DirectorySink::new(tmp.path(), SnapshotFormat::Png)?;
        let path = {
            let mut background = BackgroundSink::spawn(sink, 4)?;
            background.write(&test_frame(), Local::now())?
        };
        assert!(path.is_file());
        Ok(())
    }

    #[test]
    fn background_sink_counts_failed_writes() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("screenshots");
        let sink = DirectorySink::new(&dir, SnapshotFormat::Png)?;
        let mut background = BackgroundSink::spawn(sink, 4)?;
        std::fs::remove_dir_all(&dir)?;

        let path = background.write(&test_frame(), Local::now())?;
        background.flush();

        assert!(!path.exists());
        assert_eq!(background.deferred_failures(), 1);
        assert!(background.write(&test_frame(), Local::now()).is_err());
        Ok(())
    }
}
