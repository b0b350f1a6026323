//! Per-video-frame driver.
//!
//! Each frame pulls one detection from the tracker, gates it, and writes
//! the resulting pose and influences to the rig. A bad frame is recorded
//! and then handled as a frame with no face; it never stops the loop.

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::avatar::{extract_pose, RetargetMap, RigHandle};
use crate::config::PoseConfig;
use crate::error::TrackingError;
use crate::pipeline::gate::{GateDecision, TrackingGate};
use crate::tracking::{DetectionResult, Tracker};

/// Source of video frame timestamps.
///
/// Returns `None` when no more frames will arrive.
pub trait FrameClock {
    fn next_frame(&mut self) -> impl Future<Output = Option<Duration>> + Send;
}

/// Fixed-rate frame clock. Late frames are delayed, never queued.
pub struct IntervalClock {
    interval: Interval,
    start: Instant,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        let start = Instant::now();
        let mut interval = interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, start }
    }
}

impl FrameClock for IntervalClock {
    async fn next_frame(&mut self) -> Option<Duration> {
        let tick = self.interval.tick().await;
        Some(tick.duration_since(self.start))
    }
}

/// What a frame did to the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// Calibrating; rig untouched
    Suppressed,
    /// Pose and influences written, rig shown
    Applied,
    /// Rig hidden, pose kept
    Hidden,
    /// A fault left nothing to write to
    Skipped,
}

/// Result of one `FrameLoop::step`
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub action: FrameAction,
    /// First fault recovered from during this frame
    pub fault: Option<TrackingError>,
}

/// Running frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub applied: u64,
    pub hidden: u64,
    pub suppressed: u64,
    pub skipped: u64,
    /// Frames that hit at least one fault
    pub faults: u64,
}

/// User-visible loop status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Calibrating { remaining_ticks: u32 },
    Tracking,
    /// The very first frame faulted and the rig has not been shown since
    FaceDetectionError,
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopStatus::Calibrating { remaining_ticks } => {
                write!(f, "calibrating ({})", remaining_ticks)
            }
            LoopStatus::Tracking => write!(f, "tracking"),
            LoopStatus::FaceDetectionError => write!(f, "face detection error"),
        }
    }
}

/// Drives tracker output into a rig, one frame at a time.
pub struct FrameLoop<T, R> {
    tracker: T,
    gate: TrackingGate,
    retarget: RetargetMap,
    pose: PoseConfig,
    rig: Option<R>,
    stats: FrameStats,
    ever_shown: bool,
    first_frame_fault: bool,
}

impl<T: Tracker, R: RigHandle> FrameLoop<T, R> {
    /// Create a loop with no rig attached yet.
    pub fn new(tracker: T, gate: TrackingGate, retarget: RetargetMap, pose: &PoseConfig) -> Self {
        Self {
            tracker,
            gate,
            retarget,
            pose: pose.clone(),
            rig: None,
            stats: FrameStats::default(),
            ever_shown: false,
            first_frame_fault: false,
        }
    }

    pub fn attach_rig(&mut self, rig: R) {
        self.rig = Some(rig);
    }

    pub fn detach_rig(&mut self) -> Option<R> {
        self.rig.take()
    }

    pub fn rig(&self) -> Option<&R> {
        self.rig.as_ref()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Current status for display.
    ///
    /// `FaceDetectionError` is reported only when the first frame faulted,
    /// and only until a frame is applied. Later faults are logged and counted
    /// but leave the status alone.
    pub fn status(&self) -> LoopStatus {
        if self.first_frame_fault && !self.ever_shown {
            return LoopStatus::FaceDetectionError;
        }

        let state = self.gate.state();
        if state.is_tracking() {
            LoopStatus::Tracking
        } else {
            LoopStatus::Calibrating {
                remaining_ticks: state.remaining_ticks,
            }
        }
    }

    /// Run one frame.
    pub async fn step(&mut self, timestamp: Duration) -> FrameOutcome {
        self.stats.frames += 1;

        let (detection, mut fault) = match self.tracker.detect(timestamp).await {
            Ok(detection) => (detection, None),
            Err(e) => (DetectionResult::empty(), Some(e)),
        };

        let action = match self.drive(&detection) {
            Ok(action) => action,
            Err(e) => {
                if fault.is_none() {
                    fault = Some(e);
                }
                self.drive(&DetectionResult::empty())
                    .unwrap_or(FrameAction::Skipped)
            }
        };

        if let Some(e) = &fault {
            self.stats.faults += 1;
            if self.stats.frames == 1 && !self.ever_shown {
                self.first_frame_fault = true;
            }
            tracing::warn!("Frame at {:?} treated as no detection: {}", timestamp, e);
        }

        match action {
            FrameAction::Applied => self.stats.applied += 1,
            FrameAction::Hidden => self.stats.hidden += 1,
            FrameAction::Suppressed => self.stats.suppressed += 1,
            FrameAction::Skipped => self.stats.skipped += 1,
        }

        tracing::debug!("Frame at {:?}: {:?}", timestamp, action);
        FrameOutcome { action, fault }
    }

    /// Step once per frame until the clock runs out.
    pub async fn run<C: FrameClock>(&mut self, clock: &mut C) {
        let mut status = self.status();
        tracing::info!("Frame loop started ({})", status);

        while let Some(timestamp) = clock.next_frame().await {
            self.step(timestamp).await;

            let current = self.status();
            if current != status {
                tracing::info!("Status: {}", current);
                status = current;
            }
        }

        tracing::info!("Frame loop stopped after {} frames", self.stats.frames);
    }

    fn drive(&mut self, detection: &DetectionResult) -> Result<FrameAction, TrackingError> {
        match self.gate.gate(detection) {
            GateDecision::Suppress => Ok(FrameAction::Suppressed),
            GateDecision::Hide => {
                let rig = self.rig.as_mut().ok_or(TrackingError::RigUnavailable)?;
                rig.set_visible(false);
                rig.commit();
                Ok(FrameAction::Hidden)
            }
            GateDecision::Apply {
                transform,
                expressions,
            } => {
                let pose = extract_pose(&transform, self.pose.fixed_scale, self.pose.fixed_depth)?;
                let influences = self.retarget.retarget(expressions);

                let rig = self.rig.as_mut().ok_or(TrackingError::RigUnavailable)?;
                rig.set_pose(&pose);
                for (name, value) in &influences {
                    rig.set_influence(name, *value);
                }
                rig.set_visible(true);
                rig.commit();

                self.ever_shown = true;
                Ok(FrameAction::Applied)
            }
        }
    }
}
