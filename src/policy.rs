//! Snapshot throttling.
//!
//! The first frame with detections captures immediately. While detections persist, another
//! capture happens each time at least `interval` has elapsed since the last one. A single
//! frame without detections resets the state, so the next appearance captures immediately.
//!
//! Timestamps are monotonic `Instant`s; wall-clock adjustments cannot trigger captures.

use std::time::{Duration, Instant};

/// Default spacing between captures while presence is continuous.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceState {
    Absent,
    Present {
        since: Instant,
        last_snapshot: Instant,
    },
}

/// What the loop should do with the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureAction {
    Skip,
    Capture,
}

/// Presence state machine. Owned and mutated by the loop thread only.
#[derive(Clone, Debug)]
pub struct ScreenshotPolicy {
    interval: Duration,
    state: PresenceState,
}

impl ScreenshotPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: PresenceState::Absent,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// Advance the state machine for one frame.
    ///
    /// A returned `Capture` counts as attempted: `last_snapshot` advances whether or not the
    /// write later succeeds.
    pub fn evaluate(&mut self, present: bool, now: Instant) -> CaptureAction {
        match (self.state, present) {
            (_, false) => {
                self.state = PresenceState::Absent;
                CaptureAction::Skip
            }
            (PresenceState::Absent, true) => {
                self.state = PresenceState::Present {
                    since: now,
                    last_snapshot: now,
                };
                CaptureAction::Capture
            }
            (
                PresenceState::Present {
                    since,
                    last_snapshot,
                },
                true,
            ) => {
                if now.saturating_duration_since(last_snapshot) >= self.interval {
                    self.state = PresenceState::Present {
                        since,
                        last_snapshot: now,
                    };
                    CaptureAction::Capture
                } else {
                    CaptureAction::Skip
                }
            }
        }
    }
}

impl Default for ScreenshotPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    /// Feed `(t_secs, present)` samples and return the times at which a capture fired.
    fn run(policy: &mut ScreenshotPolicy, samples: &[(u64, bool)]) -> Vec<u64> {
        let t0 = Instant::now();
        samples
            .iter()
            .filter(|(t, present)| {
                policy.evaluate(*present, t0 + secs(*t)) == CaptureAction::Capture
            })
            .map(|(t, _)| *t)
            .collect()
    }

    #[test]
    fn continuous_presence_captures_once_within_interval() {
        let mut policy = ScreenshotPolicy::default();
        let captures = run(&mut policy, &[(0, true), (1, true), (2, true)]);
        assert_eq!(captures, vec![0]);
    }

    #[test]
    fn gap_resets_and_recaptures() {
        let mut policy = ScreenshotPolicy::default();
        let captures = run(&mut policy, &[(0, true), (5, false), (6, true)]);
        assert_eq!(captures, vec![0, 6]);
    }

    #[test]
    fn periodic_capture_while_present() {
        let mut policy = ScreenshotPolicy::default();
        let samples: Vec<(u64, bool)> = (0..=25).map(|t| (t, true)).collect();
        assert_eq!(run(&mut policy, &samples), vec![0, 20]);
    }

    #[test]
    fn periodic_capture_uses_first_sample_past_interval() {
        let mut policy = ScreenshotPolicy::default();
        let captures = run(&mut policy, &[(0, true), (13, true), (26, true), (39, true)]);
        assert_eq!(captures, vec![0, 26]);
    }

    #[test]
    fn exact_interval_is_inclusive() {
        let mut policy = ScreenshotPolicy::new(secs(20));
        let captures = run(&mut policy, &[(0, true), (20, true), (40, true)]);
        assert_eq!(captures, vec![0, 20, 40]);
    }

    #[test]
    fn absence_is_idempotent() {
        let mut policy = ScreenshotPolicy::default();
        let t0 = Instant::now();
        for i in 0..100 {
            assert_eq!(policy.evaluate(false, t0 + secs(i)), CaptureAction::Skip);
            assert_eq!(policy.state(), PresenceState::Absent);
        }
    }

    #[test]
    fn present_state_tracks_since_and_last_snapshot() {
        let mut policy = ScreenshotPolicy::new(secs(10));
        let t0 = Instant::now();
        policy.evaluate(true, t0);
        policy.evaluate(true, t0 + secs(4));
        assert_eq!(
            policy.state(),
            PresenceState::Present {
                since: t0,
                last_snapshot: t0
            }
        );
        policy.evaluate(true, t0 + secs(12));
        assert_eq!(
            policy.state(),
            PresenceState::Present {
                since: t0,
                last_snapshot: t0 + secs(12)
            }
        );
        policy.evaluate(false, t0 + secs(13));
        assert_eq!(policy.state(), PresenceState::Absent);
    }

    #[test]
    fn random_sequences_respect_throttle() {
        let interval = secs(20);
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let mut policy = ScreenshotPolicy::new(interval);
            let t0 = Instant::now();
            let mut t = Duration::ZERO;
            let mut prev_present = false;
            let mut last_capture: Option<Duration> = None;

            for _ in 0..300 {
                t += Duration::from_millis(rng.gen_range(0..4_000));
                let present = rng.gen_bool(0.85);
                let action = policy.evaluate(present, t0 + t);

                if !present {
                    assert_eq!(action, CaptureAction::Skip);
                    last_capture = None;
                } else if !prev_present {
                    assert_eq!(action, CaptureAction::Capture, "edge must capture");
                    last_capture = Some(t);
                } else {
                    let last = last_capture.expect("present run has a capture");
                    let due = t - last >= interval;
                    assert_eq!(action == CaptureAction::Capture, due);
                    if due {
                        last_capture = Some(t);
                    }
                }
                prev_present = present;
            }
        }
    }
}
