//! Calibration countdown and per-frame gating.
//!
//! Tracker output is held back for a fixed number of ticks after start so
//! the tracker's warm-up noise never reaches the rig. Once tracking, each
//! frame either drives the rig or hides it depending on whether a face was
//! found.

use glam::Mat4;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::CalibrationConfig;
use crate::tracking::{DetectionResult, Expression};

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Calibrating,
    Tracking,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Calibrating => write!(f, "calibrating"),
            Phase::Tracking => write!(f, "tracking"),
        }
    }
}

/// Countdown state shared between the calibration timer and the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalibrationState {
    pub phase: Phase,
    pub remaining_ticks: u32,
}

impl CalibrationState {
    /// Start a countdown of `ticks`. Zero ticks starts tracking immediately.
    pub fn new(ticks: u32) -> Self {
        let phase = if ticks == 0 {
            Phase::Tracking
        } else {
            Phase::Calibrating
        };
        Self {
            phase,
            remaining_ticks: ticks,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.phase == Phase::Tracking
    }

    /// Time left in the countdown for a given tick period, in whole seconds
    /// rounded up.
    pub fn seconds_remaining(&self, tick_period: Duration) -> u64 {
        let remaining = tick_period.saturating_mul(self.remaining_ticks);
        remaining.as_millis().div_ceil(1000) as u64
    }

    /// State after one countdown tick. `Tracking` is terminal.
    pub fn ticked(self) -> Self {
        match self.phase {
            Phase::Tracking => self,
            Phase::Calibrating => Self::new(self.remaining_ticks.saturating_sub(1)),
        }
    }
}

/// What the frame loop should do with one detection
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision<'a> {
    /// Still calibrating: leave the rig alone
    Suppress,
    /// Face found: drive the rig from these and show it
    Apply {
        transform: Mat4,
        expressions: &'a [Expression],
    },
    /// Face lost: hide the rig, keep its last pose
    Hide,
}

/// Decide how a detection affects the rig in the given state.
pub fn gate<'a>(state: &CalibrationState, detection: &'a DetectionResult) -> GateDecision<'a> {
    if !state.is_tracking() {
        return GateDecision::Suppress;
    }

    match (&detection.transform, &detection.expressions) {
        (Some(transform), Some(expressions)) => GateDecision::Apply {
            transform: *transform,
            expressions,
        },
        _ => GateDecision::Hide,
    }
}

/// Owner of the calibration countdown.
///
/// The clock is the only writer; the frame loop and any countdown display
/// hold `watch` receivers.
pub struct CalibrationClock {
    tx: watch::Sender<CalibrationState>,
    period: Duration,
}

impl CalibrationClock {
    pub fn new(ticks: u32, period: Duration) -> Self {
        let (tx, _) = watch::channel(CalibrationState::new(ticks));
        Self { tx, period }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.ticks, config.tick_period())
    }

    pub fn state(&self) -> CalibrationState {
        *self.tx.borrow()
    }

    /// Receiver for the frame loop or a countdown display
    pub fn subscribe(&self) -> watch::Receiver<CalibrationState> {
        self.tx.subscribe()
    }

    /// Advance the countdown by one tick and return the new state.
    pub fn tick(&self) -> CalibrationState {
        self.tx.send_if_modified(|state| {
            let next = state.ticked();
            let changed = next != *state;
            *state = next;
            changed
        });
        self.state()
    }

    /// Tick once per period until tracking starts.
    pub async fn run(self) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.state().is_tracking() {
            interval.tick().await;
            let state = self.tick();
            if state.is_tracking() {
                tracing::info!("Calibration complete, tracking started");
            } else {
                tracing::debug!("Calibrating: {} ticks remaining", state.remaining_ticks);
            }
        }
    }
}

/// Frame-side view of the calibration state
#[derive(Debug, Clone)]
pub struct TrackingGate {
    calibration: watch::Receiver<CalibrationState>,
}

impl TrackingGate {
    pub fn new(calibration: watch::Receiver<CalibrationState>) -> Self {
        Self { calibration }
    }

    pub fn state(&self) -> CalibrationState {
        *self.calibration.borrow()
    }

    pub fn gate<'a>(&self, detection: &'a DetectionResult) -> GateDecision<'a> {
        gate(&self.state(), detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_detection() -> DetectionResult {
        DetectionResult::face(
            Mat4::from_rotation_y(0.3),
            vec![Expression::new("jawOpen", 0.3)],
        )
    }

    #[test]
    fn test_initial_state() {
        let state = CalibrationState::new(3);
        assert_eq!(state.phase, Phase::Calibrating);
        assert_eq!(state.remaining_ticks, 3);

        let state = CalibrationState::new(0);
        assert!(state.is_tracking());
    }

    #[test]
    fn test_exactly_n_ticks_to_tracking() {
        let mut state = CalibrationState::new(3);
        for expected in [2, 1] {
            state = state.ticked();
            assert_eq!(state.phase, Phase::Calibrating);
            assert_eq!(state.remaining_ticks, expected);
        }
        state = state.ticked();
        assert!(state.is_tracking());
        assert_eq!(state.remaining_ticks, 0);

        // Terminal
        for _ in 0..5 {
            state = state.ticked();
            assert!(state.is_tracking());
        }
    }

    #[test]
    fn test_seconds_remaining_follows_tick_period() {
        let state = CalibrationState::new(3);
        assert_eq!(state.seconds_remaining(Duration::from_secs(1)), 3);
        assert_eq!(state.seconds_remaining(Duration::from_millis(500)), 2);
        assert_eq!(state.seconds_remaining(Duration::from_millis(250)), 1);
        assert_eq!(state.seconds_remaining(Duration::from_secs(2)), 6);
        assert_eq!(CalibrationState::new(0).seconds_remaining(Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_calibrating_suppresses_everything() {
        let detections = [
            full_detection(),
            DetectionResult::empty(),
            DetectionResult {
                transform: Some(Mat4::IDENTITY),
                expressions: None,
            },
        ];
        for remaining in 1..=3 {
            let state = CalibrationState::new(remaining);
            for detection in &detections {
                assert_eq!(gate(&state, detection), GateDecision::Suppress);
            }
        }
    }

    #[test]
    fn test_tracking_full_detection_applies() {
        let state = CalibrationState::new(0);
        let detection = full_detection();
        match gate(&state, &detection) {
            GateDecision::Apply {
                transform,
                expressions,
            } => {
                assert_eq!(transform, Mat4::from_rotation_y(0.3));
                assert_eq!(expressions.len(), 1);
            }
            other => panic!("expected Apply, got {:?}", other),
        }
    }

    #[test]
    fn test_tracking_missing_field_hides() {
        let state = CalibrationState::new(0);

        let no_transform = DetectionResult {
            transform: None,
            expressions: Some(vec![Expression::new("jawOpen", 0.3)]),
        };
        assert_eq!(gate(&state, &no_transform), GateDecision::Hide);

        let no_expressions = DetectionResult {
            transform: Some(Mat4::IDENTITY),
            expressions: None,
        };
        assert_eq!(gate(&state, &no_expressions), GateDecision::Hide);

        assert_eq!(gate(&state, &DetectionResult::empty()), GateDecision::Hide);
    }

    #[test]
    fn test_empty_expression_list_still_applies() {
        let state = CalibrationState::new(0);
        let detection = DetectionResult::face(Mat4::IDENTITY, vec![]);
        assert!(matches!(gate(&state, &detection), GateDecision::Apply { .. }));
    }

    #[test]
    fn test_clock_tick_updates_subscribers() {
        let clock = CalibrationClock::new(2, Duration::from_secs(1));
        let gate_view = TrackingGate::new(clock.subscribe());

        assert_eq!(gate_view.state().remaining_ticks, 2);
        clock.tick();
        assert_eq!(gate_view.state().remaining_ticks, 1);
        clock.tick();
        assert!(gate_view.state().is_tracking());
        clock.tick();
        assert!(gate_view.state().is_tracking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_run_reaches_tracking_after_n_periods() {
        let clock = CalibrationClock::new(3, Duration::from_secs(1));
        let gate_view = TrackingGate::new(clock.subscribe());
        let handle = tokio::spawn(clock.run());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(gate_view.state().remaining_ticks, 3);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(gate_view.state().remaining_ticks, 2);
        assert_eq!(gate_view.state().phase, Phase::Calibrating);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(gate_view.state().remaining_ticks, 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(gate_view.state().is_tracking());

        // The timer task finishes once tracking starts
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(gate_view.state().is_tracking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_display_sees_changes() {
        let clock = CalibrationClock::new(1, Duration::from_secs(1));
        let mut display = clock.subscribe();
        tokio::spawn(clock.run());

        display.changed().await.unwrap();
        let state = *display.borrow_and_update();
        assert!(state.is_tracking());
        assert_eq!(state.remaining_ticks, 0);
    }
}
