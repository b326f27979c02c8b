//! Snapwatch
//!
//! Samples frames from a live video source, runs a pattern detector over each frame, reports
//! the detection count for display and persists throttled snapshots of the scene.
//!
//! # Architecture
//!
//! A single worker runs the detection loop:
//!
//! 1. **Capture**: pull one frame from a `FrameSource`.
//! 2. **Detect**: convert to gray-scale and ask a `DetectorBackend` for bounding boxes.
//! 3. **Decide**: feed presence into `ScreenshotPolicy` (capture on first appearance, then
//!    at most once per interval while presence is continuous).
//! 4. **Persist**: write the unannotated frame through a `SnapshotSink`.
//! 5. **Present**: draw markers on a display copy and emit `(frame, count)` to a `Presenter`.
//!
//! # Module Structure
//!
//! - `frame`: Frame model, gray conversion, marker drawing, display scaling
//! - `detect`: Detector backends, registry, model catalog
//! - `ingest`: Frame sources (synthetic, image directory, V4L2)
//! - `policy`: Snapshot throttling state machine
//! - `storage`: Snapshot sinks and file naming
//! - `present`: Display handoff
//! - `pipeline`: The detection loop
//! - `control`: Start/stop control surface
//! - `config`: File + environment configuration

pub mod config;
pub mod control;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod policy;
pub mod present;
pub mod storage;

pub use config::SnapwatchConfig;
pub use control::Controller;
pub use detect::{
    BackendRegistry, BoundingBox, CpuBackend, DetectionResult, DetectorBackend, ModelCatalog,
    ModelSpec, StubBackend,
};
pub use error::{SnapwatchError, SnapwatchResult};
pub use frame::{Frame, GrayFrame};
pub use ingest::{open_source, FrameSource, SourceGuard, SourceSettings, SourceStats};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Source;
pub use ingest::{ImageDirSource, SyntheticSource};
pub use pipeline::{
    Clock, DetectionLoop, IterationOutcome, LoopSettings, LoopStats, MonotonicClock, StopToken,
};
pub use policy::{CaptureAction, PresenceState, ScreenshotPolicy, DEFAULT_SNAPSHOT_INTERVAL};
pub use present::{ChannelPresenter, FrameUpdate, LogPresenter, Presenter};
pub use storage::{
    parse_snapshot_filename, snapshot_filename, BackgroundSink, DirectorySink, SnapshotFormat,
    SnapshotRecord, SnapshotSink,
};
