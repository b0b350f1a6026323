//! ARKit expression scores → rig morph target influences.
//!
//! Tracker channel names are passed straight through to the rig; only the
//! amplitude is corrected with a per-channel gain.

use std::collections::HashMap;

use crate::tracking::Expression;

/// Channel name → influence weight. Values are not clamped.
pub type InfluenceVector = HashMap<String, f32>;

/// Gain applied to channels the tracker under-reports relative to the rig's
/// morph range (blinks and outer brow raise).
pub const DEFAULT_GAIN: f32 = 1.2;

const DEFAULT_GAIN_CHANNELS: [&str; 4] = [
    "browOuterUpLeft",
    "browOuterUpRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
];

/// The built-in gain table.
pub fn default_gains() -> HashMap<String, f32> {
    DEFAULT_GAIN_CHANNELS
        .iter()
        .map(|name| (name.to_string(), DEFAULT_GAIN))
        .collect()
}

/// Maps one frame of expression scores to rig influences.
#[derive(Debug, Clone)]
pub struct RetargetMap {
    gains: HashMap<String, f32>,
}

impl Default for RetargetMap {
    fn default() -> Self {
        Self::new(default_gains())
    }
}

impl RetargetMap {
    pub fn new(gains: HashMap<String, f32>) -> Self {
        Self { gains }
    }

    /// Gain for a channel; 1.0 when the channel has no entry.
    pub fn gain(&self, name: &str) -> f32 {
        self.gains.get(name).copied().unwrap_or(1.0)
    }

    /// Apply per-channel gain to every score.
    ///
    /// A name that appears more than once keeps its last score.
    pub fn retarget(&self, expressions: &[Expression]) -> InfluenceVector {
        let mut influences = InfluenceVector::with_capacity(expressions.len());
        for expr in expressions {
            influences.insert(expr.name.clone(), expr.score * self.gain(&expr.name));
        }
        influences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blink_gain() {
        let map = RetargetMap::default();
        for s in [0.0f32, 0.25, 0.5, 0.8] {
            let out = map.retarget(&[Expression::new("eyeBlinkLeft", s)]);
            assert!((out["eyeBlinkLeft"] - s * 1.2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_brow_outer_up_gain() {
        let map = RetargetMap::default();
        let out = map.retarget(&[
            Expression::new("browOuterUpLeft", 0.5),
            Expression::new("browOuterUpRight", 0.25),
            Expression::new("eyeBlinkRight", 0.1),
        ]);
        assert!((out["browOuterUpLeft"] - 0.6).abs() < 1e-6);
        assert!((out["browOuterUpRight"] - 0.3).abs() < 1e-6);
        assert!((out["eyeBlinkRight"] - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_unlisted_channel_passes_through() {
        let map = RetargetMap::default();
        let out = map.retarget(&[
            Expression::new("jawOpen", 0.3),
            Expression::new("mouthSmileLeft", 0.77),
            Expression::new("_neutral", 0.01),
        ]);
        assert_eq!(out["jawOpen"], 0.3);
        assert_eq!(out["mouthSmileLeft"], 0.77);
        assert_eq!(out["_neutral"], 0.01);
    }

    #[test]
    fn test_gained_value_is_not_clamped() {
        let map = RetargetMap::default();
        let out = map.retarget(&[Expression::new("eyeBlinkLeft", 1.0)]);
        assert!((out["eyeBlinkLeft"] - 1.2).abs() < 1e-6);
        assert!(out["eyeBlinkLeft"] > 1.0);
    }

    #[test]
    fn test_empty_input() {
        let map = RetargetMap::default();
        assert!(map.retarget(&[]).is_empty());
    }

    #[test]
    fn test_duplicate_name_last_wins() {
        let map = RetargetMap::default();
        let out = map.retarget(&[
            Expression::new("jawOpen", 0.1),
            Expression::new("jawOpen", 0.4),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out["jawOpen"], 0.4);
    }

    #[test]
    fn test_order_does_not_matter() {
        let map = RetargetMap::default();
        let a = map.retarget(&[
            Expression::new("eyeBlinkLeft", 0.5),
            Expression::new("jawOpen", 0.3),
        ]);
        let b = map.retarget(&[
            Expression::new("jawOpen", 0.3),
            Expression::new("eyeBlinkLeft", 0.5),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_gain_table() {
        let mut gains = HashMap::new();
        gains.insert("jawOpen".to_string(), 2.0);
        let map = RetargetMap::new(gains);

        let out = map.retarget(&[
            Expression::new("jawOpen", 0.3),
            Expression::new("eyeBlinkLeft", 0.5),
        ]);
        assert!((out["jawOpen"] - 0.6).abs() < 1e-6);
        // Default table replaced, blink passes through
        assert_eq!(out["eyeBlinkLeft"], 0.5);
    }
}
