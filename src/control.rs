//! Start/stop control surface.
//!
//! `start` does all fallible setup on the caller's thread (model load, device open,
//! snapshot directory) and reports failures synchronously. Only then is the worker spawned.

use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use crate::config::{SnapshotSettings, SnapwatchConfig};
use crate::detect::ModelCatalog;
use crate::error::{SnapwatchError, SnapwatchResult};
use crate::ingest::{open_source, SourceGuard, SourceSettings};
use crate::pipeline::{DetectionLoop, LoopSettings, LoopStats, StopToken};
use crate::present::{self, FrameUpdate, Presenter};
use crate::storage::{BackgroundSink, DirectorySink};

struct Worker {
    stop: StopToken,
    handle: JoinHandle<LoopStats>,
}

pub struct Controller {
    catalog: ModelCatalog,
    source: SourceSettings,
    snapshots: SnapshotSettings,
    settings: LoopSettings,
    display_queue_depth: usize,
    worker: Option<Worker>,
}

impl Controller {
    pub fn new(
        catalog: ModelCatalog,
        source: SourceSettings,
        snapshots: SnapshotSettings,
        settings: LoopSettings,
        display_queue_depth: usize,
    ) -> Self {
        Self {
            catalog,
            source,
            snapshots,
            settings,
            display_queue_depth,
            worker: None,
        }
    }

    pub fn from_config(cfg: &SnapwatchConfig) -> Self {
        Self::new(
            ModelCatalog::new(&cfg.model_dir),
            cfg.source.clone(),
            cfg.snapshots.clone(),
            cfg.loop_settings(),
            cfg.display.queue_depth,
        )
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Load `model_selection`, open the source and start the detection worker.
    pub fn start(
        &mut self,
        model_selection: &str,
        presenter: Box<dyn Presenter>,
    ) -> SnapwatchResult<()> {
        if self.worker.is_some() {
            if self.is_running() {
                return Err(SnapwatchError::AlreadyRunning);
            }
            self.stop();
        }

        let detector = self.catalog.load(model_selection)?;

        let device_error = |source| SnapwatchError::Device {
            url: self.source.url.clone(),
            source,
        };
        let source = open_source(&self.source).map_err(device_error)?;
        let source = SourceGuard::open(source).map_err(device_error)?;

        let sink = DirectorySink::new(&self.snapshots.dir, self.snapshots.format)
            .and_then(|sink| BackgroundSink::spawn(sink, self.snapshots.queue_depth))
            .map_err(SnapwatchError::Persistence)?;

        let pipeline = DetectionLoop::new(
            source,
            detector,
            Box::new(sink),
            presenter,
            self.settings.clone(),
        );

        let stop = StopToken::new();
        let worker_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("detection-loop".to_string())
            .spawn(move || pipeline.run(&worker_stop))
            .map_err(SnapwatchError::Worker)?;

        log::info!("detection started with model '{}'", model_selection.trim());
        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Start with a bounded display queue of the configured depth and return its receiving
    /// end. Updates are dropped while the queue is full.
    pub fn start_with_channel(
        &mut self,
        model_selection: &str,
    ) -> SnapwatchResult<Receiver<FrameUpdate>> {
        let (presenter, updates) = present::channel(self.display_queue_depth);
        self.start(model_selection, Box::new(presenter))?;
        Ok(updates)
    }

    /// Signal the worker and wait for it. Returns the loop statistics if a worker was running.
    pub fn stop(&mut self) -> Option<LoopStats> {
        let worker = self.worker.take()?;
        worker.stop.stop();
        match worker.handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                log::error!("detection worker panicked");
                None
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}
