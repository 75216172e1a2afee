//! Full runs over in-memory variants.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use accmask_media::detection::{DetectionProvider, ExecutionContext};
use accmask_media::mask::read_roi_file;
use accmask_media::{BinaryMask, Frame, MediaResult, QualityVariant, RoiEncoder, SaliencyMap};
use accmask_models::{
    BoundingBox, Detection, DetectionResults, FrameDetections, MaskConfig, MaskStrategy,
    QualityDeltas, RoiLayout, RunId,
};
use accmask_storage::{MemoryBackend, ResultsStore, SaliencyCache};
use accmask_worker::{MaskProcessor, RunConfig, WorkerError};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 32;
const FRAMES: usize = 3;
const LABEL: u32 = 2;

fn object() -> Detection {
    Detection::new(BoundingBox::new(16.0, 0.0, 16.0, 16.0), 0.95, LABEL)
}

/// Always finds the object and counts calls.
struct FixedDetector {
    calls: AtomicUsize,
}

impl FixedDetector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

impl DetectionProvider for FixedDetector {
    fn detect(&self, _frame: &Frame, _ctx: &ExecutionContext) -> MediaResult<FrameDetections> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![object()])
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn variants(dir: &Path) -> Vec<QualityVariant> {
    vec![
        QualityVariant {
            path: dir.join("clip_qp_34.mp4"),
            qp: 34,
            size: 100,
            weight: 0.5,
        },
        QualityVariant {
            path: dir.join("clip_qp_24.mp4"),
            qp: 24,
            size: 200,
            weight: 1.0,
        },
    ]
}

fn videos() -> Vec<Vec<Frame>> {
    vec![
        vec![Frame::filled(WIDTH, HEIGHT, 0.2); FRAMES],
        vec![Frame::filled(WIDTH, HEIGHT, 0.8); FRAMES],
    ]
}

fn config(dir: &Path, strategy: MaskStrategy) -> RunConfig {
    RunConfig {
        inputs: variants(dir).into_iter().map(|v| v.path).collect(),
        output: dir.join("out").join("roi.bin"),
        strategy,
        mask: MaskConfig::default().with_iterations(4),
        work_dir: dir.join("work"),
        ..RunConfig::default()
    }
}

fn encoder(layout: RoiLayout) -> RoiEncoder {
    RoiEncoder::new(layout, QualityDeltas::from_qps(24, 34, 22).unwrap())
}

async fn store_ground_truth(dir: &Path) {
    let mut results = DetectionResults::new("stored");
    for fid in 0..FRAMES as u32 {
        results.insert(fid, vec![object()]);
    }
    ResultsStore::new()
        .store(&dir.join("clip_qp_24.mp4"), &results)
        .await
        .unwrap();
}

fn read_masks(path: &Path, layout: RoiLayout) -> Vec<BinaryMask> {
    let encoder = encoder(layout);
    read_roi_file(path, &encoder, Some((2, 4)))
        .unwrap()
        .to_binary(&encoder.deltas())
        .unwrap()
}

#[tokio::test]
async fn test_ground_truth_run_uses_stored_results() {
    let dir = tempfile::tempdir().unwrap();
    store_ground_truth(dir.path()).await;
    let config = config(dir.path(), MaskStrategy::GroundTruth);
    let output = config.output.clone();

    let summary = MaskProcessor::new(config)
        .process(RunId::new(), variants(dir.path()), videos())
        .await
        .unwrap();

    assert_eq!(summary.frames, FRAMES);
    assert_eq!(summary.grid, (2, 4));
    assert!((summary.coverage - 0.125).abs() < 1e-9);

    let masks = read_masks(&output, RoiLayout::Header);
    assert_eq!(masks.len(), FRAMES);
    for mask in &masks {
        assert_eq!(mask.sum(), 1);
        assert_eq!(mask[(0, 1)], 1);
    }
}

#[tokio::test]
async fn test_missing_ground_truth_is_detected_and_stored() {
    let dir = tempfile::tempdir().unwrap();
    let detector = FixedDetector::new();
    let mut config = config(dir.path(), MaskStrategy::GroundTruth);
    config.ground_truth = Some(dir.path().join("gt.json"));

    MaskProcessor::new(config)
        .with_detector(detector.clone())
        .process(RunId::new(), variants(dir.path()), videos())
        .await
        .unwrap();

    assert_eq!(detector.calls.load(Ordering::SeqCst), FRAMES);
    let stored = ResultsStore::with_path(dir.path().join("gt.json"))
        .load(Path::new("ignored.mp4"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.application, "fixed");
    assert_eq!(stored.total_detections(), FRAMES);
}

#[tokio::test]
async fn test_region_growing_run_writes_kvazaar_layout() {
    let dir = tempfile::tempdir().unwrap();
    store_ground_truth(dir.path()).await;
    let detector = FixedDetector::new();
    let mut config = config(dir.path(), MaskStrategy::RegionGrowing);
    config.roi_layout = RoiLayout::PerFrameHeader;
    let output = config.output.clone();

    let summary = MaskProcessor::new(config)
        .with_detector(detector.clone())
        .process(RunId::new(), variants(dir.path()), videos())
        .await
        .unwrap();

    // Recovered on the first pass, so no region ever grows
    assert_eq!(summary.coverage, 0.0);
    assert!(detector.calls.load(Ordering::SeqCst) > 0);
    let masks = read_masks(&output, RoiLayout::PerFrameHeader);
    assert!(masks.iter().all(|m| m.sum() == 0));
}

#[tokio::test]
async fn test_saliency_run_reads_cache() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let mut maps = BTreeMap::new();
    for fid in 0..FRAMES as u32 {
        maps.insert(
            fid,
            SaliencyMap {
                rows: 2,
                cols: 4,
                values: vec![0.0, 0.1, 0.2, 0.9, 0.0, 0.0, 1.0, 0.3],
            },
        );
    }
    SaliencyCache::new(backend.clone())
        .store("clip_qp_24", 16, &maps)
        .await
        .unwrap();

    let mut config = config(dir.path(), MaskStrategy::Saliency);
    config.saliency_percent = 25.0;
    let output = config.output.clone();

    MaskProcessor::new(config)
        .with_cache_backend(backend)
        .process(RunId::new(), variants(dir.path()), videos())
        .await
        .unwrap();

    for mask in read_masks(&output, RoiLayout::Header) {
        assert_eq!(mask.sum(), 2);
        assert_eq!(mask[(0, 3)], 1);
        assert_eq!(mask[(1, 2)], 1);
    }
}

#[tokio::test]
async fn test_saliency_cache_miss_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), MaskStrategy::Saliency);
    let output = config.output.clone();

    let err = MaskProcessor::new(config)
        .process(RunId::new(), variants(dir.path()), videos())
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::ConfigError(_)));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_non_divisible_tile_size_rejected_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    store_ground_truth(dir.path()).await;
    let mut config = config(dir.path(), MaskStrategy::GroundTruth);
    config.mask.tile_size = 24;
    let output = config.output.clone();

    let err = MaskProcessor::new(config)
        .process(RunId::new(), variants(dir.path()), videos())
        .await
        .unwrap_err();

    assert!(err.is_input_error());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_variant_shape_mismatch_rejected() {
    let dir = tempfile::tempdir().unwrap();
    store_ground_truth(dir.path()).await;
    let mut videos = videos();
    videos[0].pop();

    let err = MaskProcessor::new(config(dir.path(), MaskStrategy::GroundTruth))
        .process(RunId::new(), variants(dir.path()), videos)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::Media(_)));
}

#[tokio::test]
async fn test_same_qp_variants_rejected_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let mut variants = variants(dir.path());
    variants[0].qp = 24;
    let config = config(dir.path(), MaskStrategy::GroundTruth);
    let output = config.output.clone();

    let err = MaskProcessor::new(config)
        .process(RunId::new(), variants, videos())
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::Encoding(_)));
    assert!(!output.exists());
}
