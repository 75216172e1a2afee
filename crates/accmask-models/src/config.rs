//! Mask optimization configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default tile edge length in pixels
pub const DEFAULT_TILE_SIZE: u32 = 16;
/// Default number of growth iterations (K)
pub const DEFAULT_NUM_ITERATIONS: u32 = 30;
/// Default growth delta in pixels per iteration
pub const DEFAULT_DELTA: f64 = 10.0;
/// Default confidence threshold for ground truth and inference
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
/// Default IoU threshold for matching inference to ground truth
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Invalid mask configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Tile size must be positive")]
    ZeroTileSize,

    #[error("Tile size {tile_size} does not divide frame dimensions {width}x{height}")]
    TileSizeNotDivisor {
        tile_size: u32,
        width: u32,
        height: u32,
    },

    #[error("Number of iterations must be at least 1")]
    ZeroIterations,

    #[error("Growth delta must be positive and finite, got {0}")]
    InvalidDelta(f64),

    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("Binarize threshold {threshold} is below baseline weight {baseline}; every uncovered tile would be high quality")]
    ThresholdBelowBaseline { threshold: f32, baseline: f32 },
}

/// Parameters of one mask optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MaskConfig {
    /// Tile edge length in pixels; must divide frame width and height
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,

    /// Number of growth iterations (the last one is the finalizing step)
    #[serde(default = "default_num_iterations")]
    pub num_iterations: u32,

    /// Pixels added to each half extent of an undetected region per iteration
    #[serde(default = "default_delta")]
    pub delta: f64,

    /// Minimum score for ground truth regions and matching inference detections
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Minimum IoU for an inference detection to match a ground truth box
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,

    /// Weight of tiles not covered by any region
    #[serde(default)]
    pub baseline_weight: f32,

    /// Tiles with weight strictly above this value binarize to high quality
    #[serde(default)]
    pub binarize_threshold: f32,
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}
fn default_num_iterations() -> u32 {
    DEFAULT_NUM_ITERATIONS
}
fn default_delta() -> f64 {
    DEFAULT_DELTA
}
fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}
fn default_iou_threshold() -> f64 {
    DEFAULT_IOU_THRESHOLD
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            num_iterations: DEFAULT_NUM_ITERATIONS,
            delta: DEFAULT_DELTA,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            baseline_weight: 0.0,
            binarize_threshold: 0.0,
        }
    }
}

impl MaskConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new config with updated tile size.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Returns a new config with updated iteration count.
    pub fn with_iterations(mut self, num_iterations: u32) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    /// Returns a new config with updated growth delta.
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Validate frame-independent parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(ConfigError::ZeroTileSize);
        }
        if self.num_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !self.delta.is_finite() || self.delta <= 0.0 {
            return Err(ConfigError::InvalidDelta(self.delta));
        }

        let unit_checks = [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
            ("baseline_weight", self.baseline_weight as f64),
            ("binarize_threshold", self.binarize_threshold as f64),
        ];
        for (name, value) in unit_checks {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.binarize_threshold < self.baseline_weight {
            return Err(ConfigError::ThresholdBelowBaseline {
                threshold: self.binarize_threshold,
                baseline: self.baseline_weight,
            });
        }

        Ok(())
    }

    /// Validate against concrete frame dimensions.
    ///
    /// A tile size that does not divide both dimensions is rejected instead of
    /// silently dropping the trailing pixels.
    pub fn validate_for(&self, width: u32, height: u32) -> Result<(), ConfigError> {
        self.validate()?;
        if width % self.tile_size != 0 || height % self.tile_size != 0 {
            return Err(ConfigError::TileSizeNotDivisor {
                tile_size: self.tile_size,
                width,
                height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MaskConfig::default();
        assert_eq!(config.tile_size, 16);
        assert_eq!(config.num_iterations, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tile_size_must_divide_frame() {
        let config = MaskConfig::default().with_tile_size(16);
        assert!(config.validate_for(1280, 720).is_ok());

        let config = MaskConfig::default().with_tile_size(64);
        assert_eq!(
            config.validate_for(1280, 720),
            Err(ConfigError::TileSizeNotDivisor {
                tile_size: 64,
                width: 1280,
                height: 720
            })
        );
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert_eq!(
            MaskConfig::default().with_tile_size(0).validate(),
            Err(ConfigError::ZeroTileSize)
        );
        assert_eq!(
            MaskConfig::default().with_iterations(0).validate(),
            Err(ConfigError::ZeroIterations)
        );
        assert!(MaskConfig::default().with_delta(-1.0).validate().is_err());

        let mut config = MaskConfig::default();
        config.iou_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange { name: "iou_threshold", .. })
        ));
    }

    #[test]
    fn test_baseline_above_threshold_rejected() {
        let mut config = MaskConfig::default();
        config.baseline_weight = 0.3;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdBelowBaseline {
                threshold: 0.0,
                baseline: 0.3
            })
        );

        config.binarize_threshold = 0.3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_defaults() {
        let config: MaskConfig = serde_json::from_str(r#"{"tile_size": 8}"#).unwrap();
        assert_eq!(config.tile_size, 8);
        assert_eq!(config.num_iterations, DEFAULT_NUM_ITERATIONS);
        assert_eq!(config.baseline_weight, 0.0);
    }
}
