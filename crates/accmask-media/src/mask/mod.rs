//! Tile masks: regions, synthesis, optimization, binarization and encoding.

pub mod binarize;
pub mod grower;
pub mod regions;
pub mod roi;
pub mod saliency;
pub mod strategies;
pub mod synth;

pub use binarize::{binarize, coverage, BinaryMask};
pub use grower::{FrameOutcome, GrowerState, IterationSummary, RegionGrower, RunBudget};
pub use regions::{Region, RegionSet, RegionTracker};
pub use roi::{read_roi_file, write_roi_file, RoiEncoder, RoiStream};
pub use saliency::{normalize, pool_tiles, SaliencyMap};
pub use strategies::{
    GeneratorBuilder, GroundTruthGenerator, MaskGenerator, MaskInput, RegionGrowingGenerator,
    SaliencyGenerator, SaliencySelection, DEFAULT_SALIENCY_PERCENT,
};
pub use synth::{blend_knots, full_mask, hybridize, rasterize, rasterize_into, TileMask};
