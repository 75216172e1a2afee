//! Mask strategy tags.
//!
//! Mask generators are statically compiled and selected by name:
//!
//! - `RegionGrowing`: iterative feedback-driven region growing (default)
//! - `GroundTruth`: ground-truth boxes rasterized directly, no feedback loop
//! - `Saliency`: thresholded per-tile saliency maps

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Strategy used to produce the per-tile mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaskStrategy {
    /// Grow regions around missed ground-truth objects until detection recovers.
    #[default]
    RegionGrowing,

    /// Keep every ground-truth box at high quality.
    GroundTruth,

    /// Keep tiles whose saliency exceeds a threshold.
    Saliency,
}

impl MaskStrategy {
    /// All available strategies.
    pub const ALL: &'static [MaskStrategy] = &[
        MaskStrategy::RegionGrowing,
        MaskStrategy::GroundTruth,
        MaskStrategy::Saliency,
    ];

    /// Returns the strategy name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskStrategy::RegionGrowing => "region_growing",
            MaskStrategy::GroundTruth => "ground_truth",
            MaskStrategy::Saliency => "saliency",
        }
    }

    /// Returns a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            MaskStrategy::RegionGrowing => "Iterative region growing driven by detection feedback",
            MaskStrategy::GroundTruth => "Ground-truth boxes at high quality",
            MaskStrategy::Saliency => "Thresholded per-tile saliency",
        }
    }

    /// Returns true if the strategy runs the detector on hybrid frames.
    pub fn requires_inference(&self) -> bool {
        matches!(self, MaskStrategy::RegionGrowing)
    }

    /// Returns true if the strategy reads saliency maps from the cache.
    pub fn uses_saliency(&self) -> bool {
        matches!(self, MaskStrategy::Saliency)
    }
}

impl fmt::Display for MaskStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MaskStrategy {
    type Err = MaskStrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "region_growing" | "iterative" => Ok(MaskStrategy::RegionGrowing),
            "ground_truth" | "gt" => Ok(MaskStrategy::GroundTruth),
            "saliency" => Ok(MaskStrategy::Saliency),
            _ => Err(MaskStrategyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown mask strategy: {0}")]
pub struct MaskStrategyParseError(String);
