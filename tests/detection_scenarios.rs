//! End-to-end behavior of the detection loop with scripted detections and a manual clock.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use snapwatch::{
    present, BoundingBox, CaptureAction, Clock, DetectionLoop, DirectorySink, Frame,
    FrameSource, FrameUpdate, IterationOutcome, LoopSettings, SnapshotFormat, SnapshotSink,
    SourceGuard, SourceStats, StopToken, StubBackend,
};

struct GraySource {
    reads: u64,
    failing_reads: Vec<u64>,
}

impl GraySource {
    fn new() -> Self {
        Self {
            reads: 0,
            failing_reads: Vec::new(),
        }
    }
}

impl FrameSource for GraySource {
    fn url(&self) -> &str {
        "test://gray"
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        self.reads += 1;
        if self.failing_reads.contains(&self.reads) {
            return Err(anyhow!("device busy"));
        }
        Frame::from_rgb(vec![90u8; 32 * 24 * 3], 32, 24)
    }

    fn close(&mut self) {}

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.reads,
            ..SourceStats::default()
        }
    }
}

#[derive(Clone, Default)]
struct CountingSink {
    writes: Arc<Mutex<u32>>,
}

impl SnapshotSink for CountingSink {
    fn write(&mut self, _frame: &Frame, _taken_at: DateTime<Local>) -> Result<PathBuf> {
        *self.writes.lock().unwrap() += 1;
        Ok(PathBuf::from("counted"))
    }
}

#[derive(Clone)]
struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    fn set_secs(&self, secs: u64) {
        *self.offset.lock().unwrap() = Duration::from_secs(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

struct Harness {
    pipeline: DetectionLoop,
    clock: ManualClock,
    updates: Receiver<FrameUpdate>,
}

fn harness(
    source: GraySource,
    presence: &[bool],
    sink: Box<dyn SnapshotSink>,
    interval_secs: u64,
) -> Harness {
    let source: Box<dyn FrameSource> = Box::new(source);
    let guard = SourceGuard::open(source).expect("open source");
    let detector = StubBackend::from_presence(presence, BoundingBox::new(4, 4, 10, 10));
    let (presenter, updates) = present::channel(4096);
    let clock = ManualClock::new();
    let settings = LoopSettings {
        snapshot_interval: Duration::from_secs(interval_secs),
        ..LoopSettings::default()
    };
    let pipeline = DetectionLoop::new(
        guard,
        Box::new(detector),
        sink,
        Box::new(presenter),
        settings,
    )
    .with_clock(Box::new(clock.clone()));
    Harness {
        pipeline,
        clock,
        updates,
    }
}

/// Run one iteration per `(t, present)` sample and return the capture times.
fn capture_times(samples: &[(u64, bool)], interval_secs: u64) -> Vec<u64> {
    let presence: Vec<bool> = samples.iter().map(|(_, p)| *p).collect();
    let mut h = harness(
        GraySource::new(),
        &presence,
        Box::new(CountingSink::default()),
        interval_secs,
    );
    let mut captures = Vec::new();
    for (t, _) in samples {
        h.clock.set_secs(*t);
        if let IterationOutcome::Processed {
            action: CaptureAction::Capture,
            ..
        } = h.pipeline.iteration()
        {
            captures.push(*t);
        }
    }
    captures
}

#[test]
fn steady_presence_captures_only_first_frame() {
    assert_eq!(capture_times(&[(0, true), (1, true), (2, true)], 20), vec![0]);
}

#[test]
fn single_empty_frame_resets_the_timer() {
    assert_eq!(
        capture_times(&[(0, true), (5, false), (6, true)], 20),
        vec![0, 6]
    );
}

#[test]
fn continuous_presence_recaptures_after_interval() {
    let samples: Vec<(u64, bool)> = (0..=25).map(|t| (t, true)).collect();
    assert_eq!(capture_times(&samples, 20), vec![0, 20]);
}

#[test]
fn no_detections_for_a_hundred_frames() {
    let sink = CountingSink::default();
    let mut h = harness(GraySource::new(), &[false; 100], Box::new(sink.clone()), 20);
    for t in 0..100 {
        h.clock.set_secs(t);
        h.pipeline.iteration();
    }
    assert_eq!(*sink.writes.lock().unwrap(), 0);
    assert_eq!(h.pipeline.stats().captures_attempted, 0);

    let counts: Vec<usize> = h.updates.try_iter().map(|u| u.count).collect();
    assert_eq!(counts.len(), 100);
    assert!(counts.iter().all(|&c| c == 0));
}

#[test]
fn failed_reads_leave_policy_untouched() {
    let mut source = GraySource::new();
    source.failing_reads = vec![2, 3];
    let sink = CountingSink::default();
    let mut h = harness(source, &[true, true], Box::new(sink.clone()), 20);

    h.clock.set_secs(0);
    h.pipeline.iteration();
    h.clock.set_secs(1);
    assert_eq!(h.pipeline.iteration(), IterationOutcome::ReadFailed);
    h.clock.set_secs(2);
    assert_eq!(h.pipeline.iteration(), IterationOutcome::ReadFailed);
    h.clock.set_secs(3);
    h.pipeline.iteration();

    // The failed reads were neither presence nor absence: still one continuous run.
    assert_eq!(*sink.writes.lock().unwrap(), 1);
    assert_eq!(h.updates.try_iter().count(), 2);
}

#[test]
fn snapshots_land_on_disk_with_parseable_names() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let sink = DirectorySink::new(tmp.path().join("shots"), SnapshotFormat::Png)?;
    let mut h = harness(GraySource::new(), &[true], Box::new(sink), 20);
    h.pipeline.iteration();

    let entries: Vec<PathBuf> = std::fs::read_dir(tmp.path().join("shots"))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(entries.len(), 1);
    let name = entries[0]
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("snapshot name"))?;
    snapwatch::parse_snapshot_filename(name)?;

    let saved = image::open(&entries[0])?.into_rgb8();
    assert!(saved.pixels().all(|p| p.0 == [90, 90, 90]));
    Ok(())
}

#[test]
fn run_stops_when_token_is_set() {
    let mut h = harness(GraySource::new(), &[], Box::new(CountingSink::default()), 20);
    h.pipeline.iteration();
    let stop = StopToken::new();
    let worker_stop = stop.clone();
    let pipeline = h.pipeline;
    let handle = std::thread::spawn(move || pipeline.run(&worker_stop));
    std::thread::sleep(Duration::from_millis(50));
    stop.stop();
    let stats = handle.join().expect("loop thread");
    assert!(stats.frames_processed >= 1);
    assert_eq!(stats.captures_attempted, 0);
}
