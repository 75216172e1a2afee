//! Region tracker.
//!
//! One region per confident ground-truth detection, centered on the box and
//! starting with zero half extent. Regions change only in two ways: an
//! additive grow by `delta`, or a reset to zero. They never shrink gradually.

use accmask_models::{BoundingBox, Detection, DetectionResults};

use crate::detection::matching::filter_by_confidence;

/// Growable rectangle keeping one ground-truth object at high quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub cx: f64,
    pub cy: f64,
    pub half_width: f64,
    pub half_height: f64,
    /// Frozen regions ignore grow and reset
    pub frozen: bool,
}

impl Region {
    /// Zero-extent region centered on a box.
    pub fn centered_on(bbox: &BoundingBox) -> Self {
        Self {
            cx: bbox.cx(),
            cy: bbox.cy(),
            half_width: 0.0,
            half_height: 0.0,
            frozen: false,
        }
    }

    /// Whether the region covers any area.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.half_width > 0.0 && self.half_height > 0.0
    }

    /// Pixel rectangle currently covered.
    pub fn rect(&self) -> BoundingBox {
        BoundingBox::from_center(self.cx, self.cy, self.half_width, self.half_height)
    }
}

/// Regions of one frame, index-aligned with the confident ground truth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSet {
    regions: Vec<Region>,
    ground_truth: Vec<Detection>,
}

impl RegionSet {
    /// Build zero-extent regions for every detection scoring at least
    /// `confidence_threshold`.
    pub fn from_ground_truth(detections: &[Detection], confidence_threshold: f64) -> Self {
        let ground_truth = filter_by_confidence(detections, confidence_threshold);
        let regions = ground_truth.iter().map(|d| Region::centered_on(&d.bbox)).collect();
        Self {
            regions,
            ground_truth,
        }
    }

    /// Regions covering the full ground-truth boxes instead of starting empty.
    pub fn covering_ground_truth(detections: &[Detection], confidence_threshold: f64) -> Self {
        let mut set = Self::from_ground_truth(detections, confidence_threshold);
        for (region, gt) in set.regions.iter_mut().zip(&set.ground_truth) {
            region.half_width = gt.bbox.width / 2.0;
            region.half_height = gt.bbox.height / 2.0;
        }
        set
    }

    /// Confident ground truth; index `i` belongs to region `i`.
    pub fn ground_truth(&self) -> &[Detection] {
        &self.ground_truth
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Add `delta` to both half extents of each indexed region.
    ///
    /// Returns the number of regions changed. Frozen and out-of-range indices
    /// are skipped.
    pub fn grow(&mut self, indices: &[usize], delta: f64) -> usize {
        self.update(indices, |region| {
            region.half_width += delta;
            region.half_height += delta;
        })
    }

    /// Reset both half extents of each indexed region to zero.
    pub fn reset(&mut self, indices: &[usize]) -> usize {
        self.update(indices, |region| {
            region.half_width = 0.0;
            region.half_height = 0.0;
        })
    }

    /// Freeze every region.
    pub fn freeze_all(&mut self) {
        for region in &mut self.regions {
            region.frozen = true;
        }
    }

    /// Whether every region is frozen.
    pub fn is_frozen(&self) -> bool {
        self.regions.iter().all(|r| r.frozen)
    }

    fn update(&mut self, indices: &[usize], apply: impl Fn(&mut Region)) -> usize {
        let mut changed = 0;
        for &idx in indices {
            if let Some(region) = self.regions.get_mut(idx) {
                if !region.frozen {
                    apply(region);
                    changed += 1;
                }
            }
        }
        changed
    }
}

/// Per-frame region sets for one optimization run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionTracker {
    frames: Vec<RegionSet>,
}

impl RegionTracker {
    /// Build zero-extent regions for frames `0..num_frames`.
    pub fn from_results(
        ground_truth: &DetectionResults,
        num_frames: usize,
        confidence_threshold: f64,
    ) -> Self {
        let frames = (0..num_frames)
            .map(|fid| RegionSet::from_ground_truth(ground_truth.frame(fid as u32), confidence_threshold))
            .collect();
        Self { frames }
    }

    /// Wrap prepared region sets, one per frame.
    pub fn from_sets(frames: Vec<RegionSet>) -> Self {
        Self { frames }
    }

    pub fn frame(&self, fid: usize) -> Option<&RegionSet> {
        self.frames.get(fid)
    }

    pub fn frame_mut(&mut self, fid: usize) -> Option<&mut RegionSet> {
        self.frames.get_mut(fid)
    }

    pub fn frames(&self) -> &[RegionSet] {
        &self.frames
    }

    /// Number of frames tracked.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total regions across all frames.
    pub fn region_count(&self) -> usize {
        self.frames.iter().map(RegionSet::len).sum()
    }

    /// Regions currently covering area.
    pub fn active_count(&self) -> usize {
        self.frames
            .iter()
            .flat_map(|set| set.regions())
            .filter(|r| r.is_active())
            .count()
    }

    /// Freeze every region of every frame.
    pub fn freeze_all(&mut self) {
        for set in &mut self.frames {
            set.freeze_all();
        }
    }
}
