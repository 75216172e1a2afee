//! Mask strategy registry.
//!
//! Each [`MaskStrategy`] tag maps to a statically compiled generator:
//! - `RegionGrowingGenerator` - feedback-driven region growing
//! - `GroundTruthGenerator` - ground-truth boxes rasterized directly
//! - `SaliencyGenerator` - cached per-tile saliency selection

use std::collections::BTreeMap;

use tracing::{info, warn};

use accmask_models::{DetectionResults, MaskConfig, MaskStrategy};

use crate::detection::{DetectionProvider, ExecutionContext};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::mask::grower::{RegionGrower, RunBudget};
use crate::mask::regions::{RegionSet, RegionTracker};
use crate::mask::saliency::SaliencyMap;
use crate::mask::synth::{full_mask, rasterize, TileMask};
use crate::tile::TileGrid;

/// Default share of tiles the saliency strategy keeps at high quality.
pub const DEFAULT_SALIENCY_PERCENT: f64 = 1.0;

/// Everything a generator may read.
pub struct MaskInput<'a> {
    pub grid: TileGrid,
    pub config: &'a MaskConfig,
    pub num_frames: usize,
    pub ground_truth: &'a DetectionResults,
    /// Frames per variant, ascending bandwidth
    pub variants: &'a [Vec<Frame>],
    pub knots: &'a [f32],
    pub detector: Option<&'a dyn DetectionProvider>,
    pub saliency: Option<&'a BTreeMap<u32, SaliencyMap>>,
    pub ctx: ExecutionContext,
    pub budget: RunBudget,
}

/// Produces one continuous tile mask per frame.
pub trait MaskGenerator: Send + Sync {
    fn generate(&self, input: &MaskInput<'_>) -> MediaResult<Vec<TileMask>>;

    fn strategy(&self) -> MaskStrategy;

    fn name(&self) -> &'static str {
        self.strategy().as_str()
    }
}

/// How the saliency strategy turns saliency into a mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SaliencySelection {
    /// Tiles above an absolute normalized saliency
    Threshold(f32),
    /// The given percentage of most salient tiles
    TopPercent(f64),
}

impl Default for SaliencySelection {
    fn default() -> Self {
        SaliencySelection::TopPercent(DEFAULT_SALIENCY_PERCENT)
    }
}

/// Iterative region growing driven by detection feedback.
#[derive(Debug, Default)]
pub struct RegionGrowingGenerator;

impl MaskGenerator for RegionGrowingGenerator {
    fn generate(&self, input: &MaskInput<'_>) -> MediaResult<Vec<TileMask>> {
        let detector = input
            .detector
            .ok_or_else(|| MediaError::internal("region growing needs a detector"))?;

        let tracker = RegionTracker::from_results(
            input.ground_truth,
            input.num_frames,
            input.config.confidence_threshold,
        );
        let mut grower = RegionGrower::new(input.config.clone(), tracker)?;
        grower.run(
            &input.grid,
            input.variants,
            input.knots,
            detector,
            &input.ctx,
            input.budget,
        )
    }

    fn strategy(&self) -> MaskStrategy {
        MaskStrategy::RegionGrowing
    }
}

/// Every confident ground-truth box at high quality.
#[derive(Debug, Default)]
pub struct GroundTruthGenerator;

impl MaskGenerator for GroundTruthGenerator {
    fn generate(&self, input: &MaskInput<'_>) -> MediaResult<Vec<TileMask>> {
        Ok((0..input.num_frames)
            .map(|fid| {
                let set = RegionSet::covering_ground_truth(
                    input.ground_truth.frame(fid as u32),
                    input.config.confidence_threshold,
                );
                rasterize(&input.grid, &set, input.config.baseline_weight)
            })
            .collect())
    }

    fn strategy(&self) -> MaskStrategy {
        MaskStrategy::GroundTruth
    }
}

/// Saliency-selected tiles at high quality.
#[derive(Debug, Default)]
pub struct SaliencyGenerator {
    selection: SaliencySelection,
}

impl SaliencyGenerator {
    pub fn new(selection: SaliencySelection) -> Self {
        Self { selection }
    }
}

impl MaskGenerator for SaliencyGenerator {
    fn generate(&self, input: &MaskInput<'_>) -> MediaResult<Vec<TileMask>> {
        let maps = input
            .saliency
            .ok_or_else(|| MediaError::internal("saliency strategy needs saliency maps"))?;
        let baseline = input.config.baseline_weight;

        (0..input.num_frames)
            .map(|fid| match maps.get(&(fid as u32)) {
                Some(map) => {
                    if (map.rows, map.cols) != input.grid.shape() {
                        return Err(MediaError::malformed_mask(
                            format!("saliency map for frame {} has a different grid", fid),
                            format!("{:?}", input.grid.shape()),
                            format!("{:?}", (map.rows, map.cols)),
                        ));
                    }
                    match self.selection {
                        SaliencySelection::Threshold(t) => map.threshold(t, baseline),
                        SaliencySelection::TopPercent(p) => map.top_percent(p, baseline),
                    }
                }
                None => {
                    warn!(fid, "No saliency for frame, keeping it at full quality");
                    Ok(full_mask(&input.grid))
                }
            })
            .collect()
    }

    fn strategy(&self) -> MaskStrategy {
        MaskStrategy::Saliency
    }
}

/// Builder for mask generators by strategy tag.
///
/// # Example
///
/// ```ignore
/// let generator = GeneratorBuilder::for_strategy(MaskStrategy::GroundTruth).build()?;
/// let masks = generator.generate(&input)?;
/// ```
pub struct GeneratorBuilder {
    strategy: MaskStrategy,
    saliency: SaliencySelection,
}

impl GeneratorBuilder {
    pub fn for_strategy(strategy: MaskStrategy) -> Self {
        Self {
            strategy,
            saliency: SaliencySelection::default(),
        }
    }

    /// Selection rule for the saliency strategy; ignored by the others.
    pub fn saliency_selection(mut self, selection: SaliencySelection) -> Self {
        self.saliency = selection;
        self
    }

    pub fn build(self) -> MediaResult<Box<dyn MaskGenerator>> {
        info!(strategy = %self.strategy, "Building mask generator");
        match self.strategy {
            MaskStrategy::RegionGrowing => Ok(Box::new(RegionGrowingGenerator)),
            MaskStrategy::GroundTruth => Ok(Box::new(GroundTruthGenerator)),
            MaskStrategy::Saliency => Ok(Box::new(SaliencyGenerator::new(self.saliency))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accmask_models::{BoundingBox, Detection};

    fn input<'a>(
        config: &'a MaskConfig,
        gt: &'a DetectionResults,
        saliency: Option<&'a BTreeMap<u32, SaliencyMap>>,
    ) -> MaskInput<'a> {
        MaskInput {
            grid: TileGrid::new(64, 32, 16).unwrap(),
            config,
            num_frames: 2,
            ground_truth: gt,
            variants: &[],
            knots: &[],
            detector: None,
            saliency,
            ctx: ExecutionContext::Cpu,
            budget: RunBudget::unlimited(),
        }
    }

    #[test]
    fn test_all_strategies_can_build() {
        for strategy in MaskStrategy::ALL {
            let generator = GeneratorBuilder::for_strategy(*strategy).build().unwrap();
            assert_eq!(generator.strategy(), *strategy);
            assert_eq!(generator.name(), strategy.as_str());
        }
    }

    #[test]
    fn test_ground_truth_generator_covers_boxes() {
        let config = MaskConfig::default();
        let mut gt = DetectionResults::new("gt");
        gt.insert(0, vec![Detection::new(BoundingBox::new(0.0, 0.0, 16.0, 16.0), 0.9, 0)]);

        let masks = GroundTruthGenerator.generate(&input(&config, &gt, None)).unwrap();

        assert_eq!(masks.len(), 2);
        assert_eq!(masks[0][(0, 0)], 1.0);
        assert_eq!(masks[0].sum(), 1.0);
        assert_eq!(masks[1].sum(), 0.0);
    }

    #[test]
    fn test_region_growing_requires_detector() {
        let config = MaskConfig::default();
        let gt = DetectionResults::new("gt");
        assert!(RegionGrowingGenerator.generate(&input(&config, &gt, None)).is_err());
    }

    #[test]
    fn test_saliency_generator_missing_frame_is_full() {
        let config = MaskConfig::default();
        let gt = DetectionResults::new("gt");
        let mut maps = BTreeMap::new();
        maps.insert(
            0,
            SaliencyMap {
                rows: 2,
                cols: 4,
                values: vec![0.0, 0.9, 0.0, 0.0, 0.0, 0.0, 0.0, 0.7],
            },
        );

        let generator = SaliencyGenerator::new(SaliencySelection::Threshold(0.5));
        let masks = generator.generate(&input(&config, &gt, Some(&maps))).unwrap();

        assert_eq!(masks[0].sum(), 2.0);
        assert_eq!(masks[0][(1, 3)], 1.0);
        assert!(masks[1].iter().all(|w| *w == 1.0));
    }

    #[test]
    fn test_saliency_grid_mismatch_rejected() {
        let config = MaskConfig::default();
        let gt = DetectionResults::new("gt");
        let mut maps = BTreeMap::new();
        maps.insert(0, SaliencyMap { rows: 1, cols: 1, values: vec![1.0] });

        let err = SaliencyGenerator::default()
            .generate(&input(&config, &gt, Some(&maps)))
            .unwrap_err();
        assert!(matches!(err, MediaError::MalformedMask { .. }));
    }
}
