//! Configuration parsing and management for FaceRig

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::avatar::rig::ARKIT_BLENDSHAPES;
use crate::avatar::retarget::default_gains;
use crate::error::{ConfigError, FaceRigError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub calibration: CalibrationConfig,
    pub pose: PoseConfig,
    pub retarget: RetargetConfig,
    pub rig: RigConfig,
    pub frame: FrameConfig,
    pub tracker: TrackerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FaceRigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, FaceRigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, FaceRigError> {
        let paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), FaceRigError> {
        if self.calibration.tick_ms == 0 {
            return Err(invalid("calibration.tick_ms", "Tick period must be greater than 0"));
        }

        if !self.pose.fixed_scale.is_finite() || self.pose.fixed_scale <= 0.0 {
            return Err(invalid("pose.fixed_scale", "Scale must be a positive number"));
        }

        if !self.pose.fixed_depth.is_finite() {
            return Err(invalid("pose.fixed_depth", "Depth must be finite"));
        }

        for (name, gain) in &self.retarget.gains {
            if !gain.is_finite() || *gain < 0.0 {
                return Err(invalid(
                    &format!("retarget.gains.{}", name),
                    "Gain must be a non-negative number",
                ));
            }
        }

        if self.rig.morph_targets.is_empty() {
            tracing::warn!("rig.morph_targets is empty; influences will have no effect");
        }

        if self.frame.fps == 0 {
            return Err(invalid("frame.fps", "FPS must be greater than 0"));
        }

        if self.tracker.port == 0 {
            return Err(invalid("tracker.port", "Port must be greater than 0"));
        }

        if self.tracker.stale_after_ms == 0 {
            return Err(invalid(
                "tracker.stale_after_ms",
                "Staleness window must be greater than 0",
            ));
        }

        if self.tracker.auto_launch && !Path::new(&self.tracker.tracker_script).exists() {
            return Err(invalid(
                "tracker.tracker_script",
                &format!(
                    "auto_launch is enabled but no script exists at {}",
                    self.tracker.tracker_script
                ),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> FaceRigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Calibration warm-up configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Number of countdown ticks before tracking output reaches the rig
    pub ticks: u32,
    /// Tick period in milliseconds
    pub tick_ms: u64,
}

impl CalibrationConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ticks: 3,
            tick_ms: 1000,
        }
    }
}

/// Fixed on-screen presentation of the rig root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Uniform scale applied to the rig root every frame
    pub fixed_scale: f32,
    /// Z position of the rig root (camera looks down -Z)
    pub fixed_depth: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            fixed_scale: 1.0,
            fixed_depth: -2.0,
        }
    }
}

/// Expression retargeting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetConfig {
    /// Per-channel gain; channels not listed pass through unchanged.
    /// Entries are layered over the built-in table.
    #[serde(deserialize_with = "gains_over_defaults")]
    pub gains: HashMap<String, f32>,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            gains: default_gains(),
        }
    }
}

fn gains_over_defaults<'de, D>(deserializer: D) -> Result<HashMap<String, f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::<String, f32>::deserialize(deserializer)?;
    let mut gains = default_gains();
    gains.extend(overrides);
    Ok(gains)
}

/// Rig configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Morph target names declared by the loaded model
    pub morph_targets: Vec<String>,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            morph_targets: ARKIT_BLENDSHAPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Video frame scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Frames per second the loop is driven at
    pub fps: u32,
}

impl FrameConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { fps: 30 }
    }
}

/// MediaPipe face tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Listen address for UDP socket
    pub listen_address: String,
    /// UDP port to receive tracker packets on
    pub port: u16,
    /// Packets older than this are treated as "no face"
    pub stale_after_ms: u64,
    /// Auto-launch the Python tracker subprocess
    pub auto_launch: bool,
    /// Path to the tracker helper script
    pub tracker_script: String,
    /// Camera device index
    pub camera_device: u32,
    /// Camera capture width
    pub capture_width: u32,
    /// Camera capture height
    pub capture_height: u32,
    /// Camera capture FPS
    pub capture_fps: u32,
    /// Auto-restart subprocess on crash
    pub auto_restart: bool,
    /// Delay before restarting crashed subprocess (seconds)
    pub restart_delay_secs: u64,
    /// Consecutive failed restarts before giving up
    pub max_restarts: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            port: 12346,
            stale_after_ms: 500,
            auto_launch: false,
            tracker_script: "scripts/face_tracker.py".to_string(),
            camera_device: 0,
            capture_width: 640,
            capture_height: 480,
            capture_fps: 30,
            auto_restart: true,
            restart_delay_secs: 3,
            max_restarts: 5,
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("facerig");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/facerig");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/facerig");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("facerig");
        }
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::RetargetMap;
    use crate::tracking::Expression;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.calibration.ticks, 3);
        assert_eq!(config.calibration.tick_period(), Duration::from_secs(1));
        assert_eq!(config.pose.fixed_scale, 1.0);
        assert_eq!(config.frame.fps, 30);
        assert_eq!(config.rig.morph_targets.len(), 52);
        assert_eq!(config.retarget.gains.get("eyeBlinkLeft"), Some(&1.2));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [calibration]
            ticks = 5

            [pose]
            fixed_depth = -3.5

            [retarget.gains]
            jawOpen = 1.5
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.calibration.ticks, 5);
        assert_eq!(config.calibration.tick_ms, 1000);
        assert_eq!(config.pose.fixed_depth, -3.5);
        assert_eq!(config.pose.fixed_scale, 1.0);
        assert_eq!(config.retarget.gains["jawOpen"], 1.5);
    }

    #[test]
    fn test_gain_override_keeps_builtin_gains() {
        let config = Config::from_str("[retarget.gains]\njawOpen = 1.5").unwrap();
        assert_eq!(config.retarget.gains.len(), 5);
        assert_eq!(config.retarget.gains["eyeBlinkLeft"], 1.2);
        assert_eq!(config.retarget.gains["browOuterUpRight"], 1.2);

        let map = RetargetMap::new(config.retarget.gains.clone());
        let out = map.retarget(&[
            Expression::new("eyeBlinkLeft", 0.5),
            Expression::new("jawOpen", 0.2),
        ]);
        assert!((out["eyeBlinkLeft"] - 0.6).abs() < 1e-6);
        assert!((out["jawOpen"] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_gain_override_can_replace_builtin_gain() {
        let config = Config::from_str("[retarget.gains]\neyeBlinkLeft = 1.0").unwrap();
        assert_eq!(config.retarget.gains["eyeBlinkLeft"], 1.0);
        assert_eq!(config.retarget.gains["eyeBlinkRight"], 1.2);
    }

    #[test]
    fn test_defaults_do_not_launch_tracker() {
        let config = Config::default();
        assert!(!config.tracker.auto_launch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auto_launch_requires_script() {
        let mut config = Config::default();
        config.tracker.auto_launch = true;
        config.tracker.tracker_script = "does/not/exist/face_tracker.py".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tracker.tracker_script"));
    }

    #[test]
    fn test_rejects_zero_fps() {
        let mut config = Config::default();
        config.frame.fps = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("frame.fps"));
    }

    #[test]
    fn test_rejects_zero_tick_period() {
        let mut config = Config::default();
        config.calibration.tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_scale_and_gain() {
        let mut config = Config::default();
        config.pose.fixed_scale = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retarget.gains.insert("jawOpen".to_string(), -1.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retarget.gains.jawOpen"));
    }

    #[test]
    fn test_parse_error() {
        let result = Config::from_str("[frame]\nfps = \"fast\"");
        assert!(matches!(
            result,
            Err(FaceRigError::Config(ConfigError::Parse(_)))
        ));
    }

    #[test]
    fn test_frame_period() {
        let frame = FrameConfig { fps: 50 };
        assert_eq!(frame.frame_period(), Duration::from_millis(20));
    }
}
