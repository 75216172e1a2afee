#![deny(unreachable_patterns)]
//! Frame handling and tile-mask optimization for accuracy-aware compression.
//!
//! This crate provides:
//! - Tile grids and pixel-rectangle to tile mapping
//! - Region tracking and feedback-driven region growing
//! - Hybrid frame synthesis across quality variants
//! - Mask binarization and the ROI control stream codec
//! - Object detection behind the `DetectionProvider` trait (YOLOv8 via ONNX)
//! - Video variant loading and frame extraction via the FFmpeg CLI

pub mod detection;
pub mod error;
pub mod frame;
pub mod mask;
pub mod metrics;
pub mod tile;
pub mod video;

pub use detection::{DetectionProvider, ExecutionContext, ObjectDetector, ObjectDetectorConfig};
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use mask::{
    binarize, blend_knots, hybridize, rasterize, read_roi_file, write_roi_file, BinaryMask,
    GeneratorBuilder, MaskGenerator, MaskInput, RegionGrower, RegionTracker, RoiEncoder,
    RunBudget, SaliencyMap, TileMask,
};
pub use tile::{TileGrid, TileSpan};
pub use video::{
    extract_frames, load_variants, read_frames, validate_shapes, QualityVariant, VideoFrames,
};
