use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, DetectionResult};
use crate::frame::GrayFrame;

/// Stub backend for testing. Replays a script of per-frame results, then reports nothing.
#[derive(Debug, Default)]
pub struct StubBackend {
    script: VecDeque<Vec<BoundingBox>>,
    calls: u64,
}

impl StubBackend {
    /// Backend that returns `script[i]` on the i-th call.
    pub fn scripted(script: impl IntoIterator<Item = Vec<BoundingBox>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    /// Backend that returns `boxes` when the matching entry in `presence` is true.
    pub fn from_presence(presence: &[bool], bbox: BoundingBox) -> Self {
        Self::scripted(
            presence
                .iter()
                .map(|&present| if present { vec![bbox] } else { Vec::new() }),
        )
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &GrayFrame) -> Result<DetectionResult> {
        self.calls += 1;
        Ok(DetectionResult::new(
            self.script.pop_front().unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_replays_script() -> Result<()> {
        let frame = GrayFrame::new(vec![0u8; 4], 2, 2)?;
        let bbox = BoundingBox::new(0, 0, 1, 1);
        let mut backend = StubBackend::from_presence(&[true, false], bbox);

        assert_eq!(backend.detect(&frame)?.count(), 1);
        assert_eq!(backend.detect(&frame)?.count(), 0);
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.calls(), 3);
        Ok(())
    }
}
