//! FaceRig - Headless face tracking to avatar rig retargeting
//!
//! Drives a 3D avatar rig from per-frame face tracker output:
//! - Holds tracker output back during a short calibration countdown
//! - Extracts a stable head pose (tracked rotation, fixed depth and scale)
//! - Retargets ARKit expression scores to morph target influences
//! - Hides the rig whenever the face is lost

pub mod avatar;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod tracking;

pub use config::Config;
pub use error::{FaceRigError, Result, TrackingError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
