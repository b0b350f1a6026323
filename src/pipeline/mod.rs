//! Retargeting pipeline
//!
//! Calibration gating and the per-frame loop that connects a tracker to a
//! rig.

pub mod frame_loop;
pub mod gate;

pub use frame_loop::{
    FrameAction, FrameClock, FrameLoop, FrameOutcome, FrameStats, IntervalClock, LoopStatus,
};
pub use gate::{gate, CalibrationClock, CalibrationState, GateDecision, Phase, TrackingGate};
