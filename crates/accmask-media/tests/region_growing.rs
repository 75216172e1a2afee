//! End-to-end region growing against scripted detectors.

use std::sync::atomic::{AtomicUsize, Ordering};

use accmask_media::detection::{DetectionProvider, ExecutionContext};
use accmask_media::mask::{
    binarize, blend_knots, FrameOutcome, GrowerState, RegionGrower, RegionSet, RegionTracker,
    RoiEncoder, RunBudget,
};
use accmask_media::{Frame, MediaError, MediaResult, TileGrid, TileMask};
use accmask_models::{
    BoundingBox, Detection, DetectionResults, FrameDetections, MaskConfig, QualityDeltas,
    RoiLayout,
};

const WIDTH: u32 = 128;
const HEIGHT: u32 = 64;
const TILE: u32 = 16;
const LABEL: u32 = 2;

fn ground_truth_box() -> BoundingBox {
    BoundingBox::new(40.0, 16.0, 32.0, 32.0)
}

fn ground_truth(frames: u32) -> DetectionResults {
    let mut results = DetectionResults::new("scripted");
    for fid in 0..frames {
        results.insert(fid, vec![Detection::new(ground_truth_box(), 0.95, LABEL)]);
    }
    results
}

/// Low variant is black, high variant is white.
fn variants(frames: usize) -> Vec<Vec<Frame>> {
    vec![
        vec![Frame::filled(WIDTH, HEIGHT, 0.0); frames],
        vec![Frame::filled(WIDTH, HEIGHT, 1.0); frames],
    ]
}

fn decoy() -> Detection {
    Detection::new(BoundingBox::new(0.0, 0.0, 4.0, 4.0), 0.9, LABEL + 1)
}

/// Finds the object only when every pixel of its box comes from the high
/// quality variant.
struct CoverageDetector;

impl DetectionProvider for CoverageDetector {
    fn detect(&self, frame: &Frame, _ctx: &ExecutionContext) -> MediaResult<FrameDetections> {
        let b = ground_truth_box();
        let data = frame.data();
        let covered = (b.y as usize..b.y2() as usize)
            .all(|y| (b.x as usize..b.x2() as usize).all(|x| data[[y, x, 0]] > 0.99));

        Ok(if covered {
            vec![Detection::new(b, 0.9, LABEL)]
        } else {
            vec![decoy()]
        })
    }

    fn name(&self) -> &str {
        "coverage"
    }
}

/// Misses until call `hit_at`, then finds the object.
struct ScriptedDetector {
    calls: AtomicUsize,
    hit_at: usize,
}

impl DetectionProvider for ScriptedDetector {
    fn detect(&self, _frame: &Frame, _ctx: &ExecutionContext) -> MediaResult<FrameDetections> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(if call >= self.hit_at {
            vec![Detection::new(ground_truth_box(), 0.9, LABEL)]
        } else {
            vec![decoy()]
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct FailingDetector;

impl DetectionProvider for FailingDetector {
    fn detect(&self, _frame: &Frame, _ctx: &ExecutionContext) -> MediaResult<FrameDetections> {
        Err(MediaError::detection_failed("model crashed"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

struct SilentDetector;

impl DetectionProvider for SilentDetector {
    fn detect(&self, _frame: &Frame, _ctx: &ExecutionContext) -> MediaResult<FrameDetections> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "silent"
    }
}

fn grower(k: u32, frames: u32) -> RegionGrower {
    let config = MaskConfig::default().with_iterations(k).with_delta(10.0);
    let tracker = RegionTracker::from_results(&ground_truth(frames), frames as usize, 0.5);
    RegionGrower::new(config, tracker).unwrap()
}

fn run(grower: &mut RegionGrower, detector: &dyn DetectionProvider, frames: usize) -> Vec<TileMask> {
    let grid = TileGrid::new(WIDTH, HEIGHT, TILE).unwrap();
    let knots = blend_knots(&[0.3, 1.0]);
    grower
        .run(
            &grid,
            &variants(frames),
            &knots,
            detector,
            &ExecutionContext::Cpu,
            RunBudget::unlimited(),
        )
        .unwrap()
}

fn half_widths(grower: &RegionGrower) -> Vec<f64> {
    grower.tracker().frame(0).unwrap().regions().iter().map(|r| r.half_width).collect()
}

fn half_extent(grower: &RegionGrower, fid: usize) -> (f64, f64) {
    let region = grower.tracker().frame(fid).unwrap().regions()[0];
    (region.half_width, region.half_height)
}

#[test]
fn test_match_on_final_iteration_keeps_grown_extent() {
    let k = 6;
    let detector = ScriptedDetector {
        calls: AtomicUsize::new(0),
        hit_at: (k - 1) as usize,
    };
    let mut grower = grower(k, 1);

    run(&mut grower, &detector, 1);

    assert_eq!(grower.state(), GrowerState::Done);
    let expected = (k - 1) as f64 * 10.0;
    assert_eq!(half_extent(&grower, 0), (expected, expected));
}

#[test]
fn test_region_stops_growing_once_recovered() {
    let mut grower = grower(10, 2);
    let masks = run(&mut grower, &CoverageDetector, 2);

    // One grow already reaches the partly covered tiles around the box
    assert_eq!(half_extent(&grower, 0), (10.0, 10.0));
    assert_eq!(half_extent(&grower, 1), (10.0, 10.0));

    let bits = binarize(&masks[0], 0.0);
    assert_eq!(bits.sum(), 2 * 3);
    for row in 1..3 {
        for col in 2..5 {
            assert_eq!(bits[(row, col)], 1, "tile ({row}, {col}) should be high quality");
        }
    }
}

#[test]
fn test_never_recovered_region_resets_to_zero() {
    let detector = ScriptedDetector {
        calls: AtomicUsize::new(0),
        hit_at: usize::MAX,
    };
    let mut grower = grower(5, 1);
    let masks = run(&mut grower, &detector, 1);

    assert_eq!(half_extent(&grower, 0), (0.0, 0.0));
    assert_eq!(binarize(&masks[0], 0.0).sum(), 0);
}

#[test]
fn test_failed_inference_leaves_regions_unchanged() {
    let mut grower = grower(4, 2);
    run(&mut grower, &FailingDetector, 2);

    assert_eq!(grower.state(), GrowerState::Done);
    assert_eq!(half_extent(&grower, 0), (0.0, 0.0));
    assert_eq!(half_extent(&grower, 1), (0.0, 0.0));
}

#[test]
fn test_empty_inference_leaves_regions_unchanged() {
    let mut grower = grower(4, 1);
    run(&mut grower, &SilentDetector, 1);
    assert_eq!(half_extent(&grower, 0), (0.0, 0.0));
}

#[test]
fn test_exhausted_budget_keeps_current_regions() {
    let mut grower = grower(8, 1);
    let grid = TileGrid::new(WIDTH, HEIGHT, TILE).unwrap();

    let masks = grower
        .run(
            &grid,
            &variants(1),
            &[0.0, 1.0],
            &CoverageDetector,
            &ExecutionContext::Cpu,
            RunBudget::with_timeout(std::time::Duration::ZERO),
        )
        .unwrap();

    assert_eq!(grower.state(), GrowerState::Done);
    assert_eq!(grower.iteration(), 0);
    assert_eq!(masks.len(), 1);
}

#[test]
fn test_frame_count_mismatch_rejected_before_iterating() {
    let mut grower = grower(3, 2);
    let grid = TileGrid::new(WIDTH, HEIGHT, TILE).unwrap();

    let err = grower
        .run(
            &grid,
            &variants(1),
            &[0.0, 1.0],
            &CoverageDetector,
            &ExecutionContext::Cpu,
            RunBudget::unlimited(),
        )
        .unwrap_err();

    assert!(matches!(err, MediaError::ShapeMismatch(_)));
    assert_eq!(grower.iteration(), 0);
}

#[test]
fn test_growth_is_monotonic_and_matched_regions_untouched() {
    let k = 12;
    let objects = 4;
    let dets: Vec<Detection> = (0..objects)
        .map(|i| Detection::new(BoundingBox::new(i as f64 * 30.0, 0.0, 10.0, 10.0), 0.9, 0))
        .collect();
    let tracker = RegionTracker::from_sets(vec![RegionSet::from_ground_truth(&dets, 0.5)]);
    let config = MaskConfig::default().with_iterations(k).with_delta(7.5);
    let mut grower = RegionGrower::new(config, tracker).unwrap();

    // Deterministic pseudo-random miss pattern
    let mut seed: u32 = 0x2545_f491;
    while grower.state() == GrowerState::Growing {
        let mut undetected = Vec::new();
        for idx in 0..objects {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 != 0 {
                undetected.push(idx);
            }
        }

        let before = half_widths(&grower);
        grower.apply(&[FrameOutcome::Scored {
            undetected: undetected.clone(),
        }]);
        let after = half_widths(&grower);

        for idx in 0..objects {
            assert!(after[idx] >= before[idx]);
            if undetected.contains(&idx) {
                assert_eq!(after[idx], before[idx] + 7.5);
            } else {
                assert_eq!(after[idx], before[idx]);
            }
        }
    }

    assert_eq!(grower.state(), GrowerState::Finalizing);
    assert_eq!(grower.iteration(), k - 1);
}

#[test]
fn test_final_masks_survive_roi_round_trip() {
    let mut grower = grower(10, 3);
    let masks = run(&mut grower, &CoverageDetector, 3);
    let bits: Vec<_> = masks.iter().map(|m| binarize(m, 0.0)).collect();

    let deltas = QualityDeltas::from_qps(24, 34, 22).unwrap();
    for layout in [RoiLayout::Header, RoiLayout::PerFrameHeader] {
        let encoder = RoiEncoder::new(layout, deltas);
        let bytes = encoder.encode(&bits).unwrap();
        let decoded = encoder.decode(&bytes, Some((4, 8))).unwrap();
        assert_eq!(decoded.to_binary(&deltas).unwrap(), bits);
    }
}
