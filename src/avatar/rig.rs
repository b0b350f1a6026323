//! Rig write boundary.
//!
//! The pipeline only ever writes to a rig: one root pose, named morph
//! target influences and a visibility flag. `MorphRig` is the in-process
//! implementation; it resolves names against the model's declared morph
//! targets and publishes a snapshot per frame for an external renderer.

use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::avatar::Pose;

/// The 52 ARKit blendshape names emitted by MediaPipe Face Landmarker.
pub const ARKIT_BLENDSHAPES: [&str; 52] = [
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "eyeWideLeft",
    "eyeWideRight",
    "jawForward",
    "jawLeft",
    "jawOpen",
    "jawRight",
    "mouthClose",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthFunnel",
    "mouthLeft",
    "mouthLowerDownLeft",
    "mouthLowerDownRight",
    "mouthPressLeft",
    "mouthPressRight",
    "mouthPucker",
    "mouthRight",
    "mouthRollLower",
    "mouthRollUpper",
    "mouthShrugLower",
    "mouthShrugUpper",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthUpperUpLeft",
    "mouthUpperUpRight",
    "noseSneerLeft",
    "noseSneerRight",
    "tongueOut",
];

/// Write target for the retargeting pipeline.
pub trait RigHandle {
    /// Set the root transform.
    fn set_pose(&mut self, pose: &Pose);

    /// Set one morph target influence. Unknown names are ignored.
    fn set_influence(&mut self, name: &str, value: f32);

    /// Show or hide the rig.
    fn set_visible(&mut self, visible: bool);

    /// Called once after a frame's updates have been written.
    fn commit(&mut self) {}
}

/// Rig state published to renderers after each committed frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RigSnapshot {
    pub visible: bool,
    pub pose: Pose,
    /// Weights in declared morph target order
    pub weights: Vec<f32>,
}

/// In-process rig addressed by morph target name.
pub struct MorphRig {
    /// Morph target name → index in the weights array
    name_to_index: HashMap<String, usize>,
    weights: Vec<f32>,
    pose: Pose,
    visible: bool,
    snapshot_tx: broadcast::Sender<RigSnapshot>,
}

impl MorphRig {
    /// Create a hidden rig from the model's morph target name list.
    pub fn new(morph_target_names: &[String]) -> Self {
        let mut name_to_index = HashMap::new();
        for (i, name) in morph_target_names.iter().enumerate() {
            name_to_index.insert(name.clone(), i);
        }
        let (snapshot_tx, _) = broadcast::channel(16);

        Self {
            weights: vec![0.0; morph_target_names.len()],
            name_to_index,
            pose: Pose::default(),
            visible: false,
            snapshot_tx,
        }
    }

    /// Subscribe to per-frame snapshots
    pub fn subscribe(&self) -> broadcast::Receiver<RigSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> RigSnapshot {
        RigSnapshot {
            visible: self.visible,
            pose: self.pose,
            weights: self.weights.clone(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Current weight of a named morph target, if the rig declares it
    pub fn weight(&self, name: &str) -> Option<f32> {
        self.name_to_index.get(name).map(|&idx| self.weights[idx])
    }

    pub fn num_targets(&self) -> usize {
        self.weights.len()
    }
}

impl RigHandle for MorphRig {
    fn set_pose(&mut self, pose: &Pose) {
        self.pose = *pose;
    }

    fn set_influence(&mut self, name: &str, value: f32) {
        if let Some(&idx) = self.name_to_index.get(name) {
            self.weights[idx] = value;
        }
    }

    fn set_visible(&mut self, visible: bool) {
        if visible != self.visible {
            tracing::debug!("Rig visibility: {}", visible);
        }
        self.visible = visible;
    }

    fn commit(&mut self) {
        // No subscribers is fine
        let _ = self.snapshot_tx.send(self.snapshot());
    }
}
