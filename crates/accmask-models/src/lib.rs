//! Shared data models for accmask.
//!
//! This crate provides Serde-serializable types for:
//! - Pixel-space bounding boxes and detections
//! - Per-frame detection results (ground truth and inference)
//! - Mask optimization configuration
//! - Quality-delta settings for the ROI control stream
//! - Mask strategy tags and run identifiers

pub mod bbox;
pub mod config;
pub mod detection;
pub mod encoding;
pub mod run;
pub mod strategy;

// Re-export common types
pub use bbox::BoundingBox;
pub use config::{ConfigError, MaskConfig};
pub use detection::{Detection, DetectionResults, FrameDetections};
pub use encoding::{qp_from_name, QpParseError, QualityDeltas, RoiLayout, DEFAULT_BASE_QP};
pub use run::RunId;
pub use strategy::{MaskStrategy, MaskStrategyParseError};
