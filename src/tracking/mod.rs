//! Tracking module
//!
//! Face tracker boundary for the retargeting pipeline:
//! - `DetectionResult`: one frame of tracker output
//! - `Tracker`: the per-frame detection seam
//! - MediaPipe Face Landmarker (JSON over UDP) and its helper subprocess

pub mod mediapipe;
pub mod subprocess;

use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::TrackingError;

/// A single named expression score from the tracker (ARKit naming)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(alias = "categoryName")]
    pub name: String,
    pub score: f32,
}

impl Expression {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Tracker output for one video frame.
///
/// A missing `transform` or `expressions` means no face was detected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    /// Facial transformation matrix (rigid/affine, column-major)
    pub transform: Option<Mat4>,
    /// Expression scores in tracker order
    pub expressions: Option<Vec<Expression>>,
}

impl DetectionResult {
    /// A frame with no face
    pub fn empty() -> Self {
        Self::default()
    }

    /// A frame with both a transform and expression scores
    pub fn face(transform: Mat4, expressions: Vec<Expression>) -> Self {
        Self {
            transform: Some(transform),
            expressions: Some(expressions),
        }
    }

    /// Whether both fields needed to drive the rig are present
    pub fn is_complete(&self) -> bool {
        self.transform.is_some() && self.expressions.is_some()
    }
}

/// Source of per-frame detections.
///
/// `detect` is awaited once per video frame; at most one call is in flight.
pub trait Tracker {
    fn detect(
        &mut self,
        timestamp: Duration,
    ) -> impl Future<Output = Result<DetectionResult, TrackingError>> + Send;
}
