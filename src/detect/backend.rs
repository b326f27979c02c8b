use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::GrayFrame;

/// Detector backend trait.
///
/// Backends are synchronous. There is no timeout around `detect`; a slow backend stalls the
/// loop that owns it.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a gray-scale frame.
    ///
    /// Implementations must treat the frame as read-only.
    fn detect(&mut self, frame: &GrayFrame) -> Result<DetectionResult>;

    /// Optional warm-up hook, called once before the loop starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
