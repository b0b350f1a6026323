//! Avatar rig module
//!
//! Pure mappings from tracker output to rig inputs, and the rig write
//! boundary.

pub mod pose;
pub mod retarget;
pub mod rig;

pub use pose::{extract_pose, Pose};
pub use retarget::{InfluenceVector, RetargetMap};
pub use rig::{MorphRig, RigHandle, RigSnapshot};
