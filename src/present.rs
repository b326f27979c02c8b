//! Presentation handoff.
//!
//! The loop pushes `(annotated frame, count)` updates to a `Presenter`. Presenters only
//! receive values; nothing flows back into loop state.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use crate::frame::Frame;

/// One display update: the annotated, display-scaled frame and its detection count.
#[derive(Clone, Debug)]
pub struct FrameUpdate {
    pub frame: Frame,
    pub count: usize,
}

impl FrameUpdate {
    pub fn overlay_text(&self) -> String {
        overlay_text(self.count)
    }
}

/// Count label shown next to the video.
pub fn overlay_text(count: usize) -> String {
    format!("Detected: {}", count)
}

/// Receives updates on the loop thread.
pub trait Presenter: Send {
    fn on_update(&mut self, update: FrameUpdate);
}

/// Hands updates to another thread through a bounded queue.
///
/// When the consumer falls behind the update is dropped; the loop never waits on the
/// display.
pub struct ChannelPresenter {
    tx: SyncSender<FrameUpdate>,
    dropped: u64,
    disconnected: bool,
}

impl ChannelPresenter {
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Create a bounded presenter channel holding at most `depth` pending updates.
pub fn channel(depth: usize) -> (ChannelPresenter, Receiver<FrameUpdate>) {
    let (tx, rx) = mpsc::sync_channel(depth);
    (
        ChannelPresenter {
            tx,
            dropped: 0,
            disconnected: false,
        },
        rx,
    )
}

impl Presenter for ChannelPresenter {
    fn on_update(&mut self, update: FrameUpdate) {
        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::debug!("presenter queue full, dropped update #{}", self.dropped);
            }
            Err(TrySendError::Disconnected(_)) => {
                if !self.disconnected {
                    log::warn!("presenter receiver gone, updates discarded");
                    self.disconnected = true;
                }
            }
        }
    }
}

/// Logs the overlay text whenever the detection count changes.
#[derive(Debug, Default)]
pub struct LogPresenter {
    last_count: Option<usize>,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for LogPresenter {
    fn on_update(&mut self, update: FrameUpdate) {
        if self.last_count != Some(update.count) {
            log::info!(
                "{} ({}x{})",
                update.overlay_text(),
                update.frame.width(),
                update.frame.height()
            );
            self.last_count = Some(update.count);
        }
    }
}
