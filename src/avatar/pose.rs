//! Head pose extraction from the tracker's facial transformation matrix.

use glam::{Mat4, Quat, Vec3};
use serde::Serialize;

use crate::error::TrackingError;

/// Matrices with a smaller absolute determinant are treated as degenerate.
const MIN_DETERMINANT: f32 = 1e-8;

/// Root transform applied to the rig for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

/// Decompose `transform` and keep only its rotation.
///
/// Monocular translation and scale are too noisy to use, so the rig sits at
/// `(0, 0, fixed_depth)` with uniform `fixed_scale`.
pub fn extract_pose(
    transform: &Mat4,
    fixed_scale: f32,
    fixed_depth: f32,
) -> Result<Pose, TrackingError> {
    if !transform.is_finite() {
        return Err(TrackingError::Decomposition(
            "matrix has non-finite elements".to_string(),
        ));
    }

    let det = transform.determinant();
    if det.abs() < MIN_DETERMINANT {
        return Err(TrackingError::Decomposition(format!(
            "matrix is singular (det = {})",
            det
        )));
    }

    let (_scale, rotation, _translation) = transform.to_scale_rotation_translation();
    let rotation = rotation.normalize();
    if !rotation.is_finite() {
        return Err(TrackingError::Decomposition(
            "rotation could not be recovered".to_string(),
        ));
    }

    Ok(Pose {
        position: Vec3::new(0.0, 0.0, fixed_depth),
        rotation,
        scale: fixed_scale,
    })
}
