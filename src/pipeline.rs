//! Capture → detect → decide → persist loop.
//!
//! One worker runs iterations strictly one after another, so policy state needs no locking.
//! Each iteration:
//! 1. reads a frame (failures skip the iteration and are retried after `retry_delay`)
//! 2. derives the gray-scale detection input
//! 3. runs the detector
//! 4. feeds presence into the `ScreenshotPolicy`
//! 5. on `Capture`, hands the unannotated frame to the sink, named by its capture time
//! 6. draws markers on the display frame and scales it
//! 7. emits `(frame, count)` to the presenter
//!
//! The stop flag is checked before every iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::DetectorBackend;
use crate::error::SnapwatchError;
use crate::frame::{MARKER_COLOR, MARKER_THICKNESS};
use crate::ingest::{FrameSource, SourceGuard};
use crate::policy::{CaptureAction, ScreenshotPolicy, DEFAULT_SNAPSHOT_INTERVAL};
use crate::present::{FrameUpdate, Presenter};
use crate::storage::SnapshotSink;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Cooperative stop flag shared between the control surface and the worker.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Monotonic time source for the snapshot policy.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub snapshot_interval: Duration,
    pub display_max_width: u32,
    pub display_max_height: u32,
    /// Pause after a failed iteration, so a dead device does not spin the CPU.
    pub retry_delay: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            display_max_width: 640,
            display_max_height: 480,
            retry_delay: Duration::from_millis(10),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_processed: u64,
    pub read_failures: u64,
    pub detect_failures: u64,
    pub captures_attempted: u64,
    pub persistence_failures: u64,
}

/// What a single iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationOutcome {
    ReadFailed,
    DetectFailed,
    Processed { count: usize, action: CaptureAction },
}

pub struct DetectionLoop {
    source: SourceGuard<Box<dyn FrameSource>>,
    detector: Box<dyn DetectorBackend>,
    policy: ScreenshotPolicy,
    sink: Box<dyn SnapshotSink>,
    presenter: Box<dyn Presenter>,
    clock: Box<dyn Clock>,
    settings: LoopSettings,
    stats: LoopStats,
    last_health_log: Instant,
}

impl DetectionLoop {
    pub fn new(
        source: SourceGuard<Box<dyn FrameSource>>,
        detector: Box<dyn DetectorBackend>,
        sink: Box<dyn SnapshotSink>,
        presenter: Box<dyn Presenter>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            detector,
            policy: ScreenshotPolicy::new(settings.snapshot_interval),
            sink,
            presenter,
            clock: Box::new(MonotonicClock),
            settings,
            stats: LoopStats::default(),
            last_health_log: Instant::now(),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Counters so far, including writes the sink accepted and failed afterwards.
    pub fn stats(&self) -> LoopStats {
        let mut stats = self.stats.clone();
        stats.persistence_failures += self.sink.deferred_failures();
        stats
    }

    pub fn policy(&self) -> &ScreenshotPolicy {
        &self.policy
    }

    /// Run one iteration.
    pub fn iteration(&mut self) -> IterationOutcome {
        let frame = match self.source.read() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.read_failures += 1;
                log::warn!("frame read failed: {:#}", e);
                return IterationOutcome::ReadFailed;
            }
        };

        let gray = frame.to_gray();
        let result = match self.detector.detect(&gray) {
            Ok(result) => result,
            Err(e) => {
                self.stats.detect_failures += 1;
                log::warn!("detector {} failed: {:#}", self.detector.name(), e);
                return IterationOutcome::DetectFailed;
            }
        };
        let count = result.count();

        let action = self.policy.evaluate(count > 0, self.clock.now());
        if action == CaptureAction::Capture {
            self.stats.captures_attempted += 1;
            if let Err(e) = self.sink.write(&frame, frame.wall_time()) {
                self.stats.persistence_failures += 1;
                log::warn!("{:#}", SnapwatchError::Persistence(e));
            }
        }

        // The sink has already taken the unannotated pixels; the frame is display-only now.
        let mut display = frame;
        for bbox in &result.boxes {
            display.draw_box(bbox, MARKER_COLOR, MARKER_THICKNESS);
        }
        let display = match display
            .scaled_to_fit(self.settings.display_max_width, self.settings.display_max_height)
        {
            Ok(scaled) => scaled,
            Err(e) => {
                log::debug!("display scaling failed, emitting full size: {:#}", e);
                display
            }
        };
        self.presenter.on_update(FrameUpdate {
            frame: display,
            count,
        });

        self.stats.frames_processed += 1;
        IterationOutcome::Processed { count, action }
    }

    /// Run until `stop` is set. Pending snapshot writes are drained and the frame source is
    /// released before this returns.
    pub fn run(mut self, stop: &StopToken) -> LoopStats {
        log::info!(
            "detection loop running (source={}, detector={}, interval={}s)",
            self.source.source().url(),
            self.detector.name(),
            self.policy.interval().as_secs_f64()
        );

        while !stop.is_stopped() {
            match self.iteration() {
                IterationOutcome::ReadFailed | IterationOutcome::DetectFailed => {
                    std::thread::sleep(self.settings.retry_delay);
                }
                IterationOutcome::Processed { .. } => {}
            }

            if self.last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let source_stats = self.source.source().stats();
                log::debug!(
                    "source health={} frames={} url={} processed={} captures={}",
                    self.source.source().is_healthy(),
                    source_stats.frames_captured,
                    source_stats.url,
                    self.stats.frames_processed,
                    self.stats.captures_attempted
                );
                self.last_health_log = Instant::now();
            }
        }

        self.sink.flush();
        let stats = self.stats();
        log::info!(
            "detection loop stopped: processed={} read_failures={} detect_failures={} captures={} persistence_failures={}",
            stats.frames_processed,
            stats.read_failures,
            stats.detect_failures,
            stats.captures_attempted,
            stats.persistence_failures
        );
        stats
    }
}
