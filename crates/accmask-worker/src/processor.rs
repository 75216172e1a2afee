//! Mask optimization run.
//!
//! One run decodes every quality variant, resolves ground truth and saliency,
//! generates per-frame tile masks with the configured strategy, then writes
//! the binarized masks as an ROI control stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn, Instrument};

use accmask_media::detection::{DetectionProvider, ExecutionContext};
use accmask_media::mask::{
    binarize, coverage, write_roi_file, GeneratorBuilder, MaskInput, RoiEncoder, RunBudget,
    SaliencySelection,
};
use accmask_media::video::{bandwidth_weights, decode_variant, load_variants, QualityVariant};
use accmask_media::{blend_knots, validate_shapes, Frame, ObjectDetector, ObjectDetectorConfig, TileGrid};
use accmask_models::{DetectionResults, QualityDeltas, RunId};
use accmask_storage::{CacheBackend, LocalFsBackend, MemoryBackend, ResultsStore, SaliencyCache};

use crate::config::RunConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub strategy: String,
    pub frames: usize,
    /// Tile grid as `(rows, cols)`
    pub grid: (usize, usize),
    /// Mean share of high quality tiles
    pub coverage: f64,
    pub output: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Runs one mask optimization from decoded variants to ROI file.
pub struct MaskProcessor {
    config: RunConfig,
    detector: Option<Arc<dyn DetectionProvider>>,
    cache: SaliencyCache,
}

impl MaskProcessor {
    pub fn new(config: RunConfig) -> Self {
        let backend: Arc<dyn CacheBackend> = match &config.cache_dir {
            Some(dir) => Arc::new(LocalFsBackend::new(dir)),
            None => Arc::new(MemoryBackend::new()),
        };
        Self {
            config,
            detector: None,
            cache: SaliencyCache::new(backend),
        }
    }

    /// Use `detector` instead of loading the ONNX model.
    pub fn with_detector(mut self, detector: Arc<dyn DetectionProvider>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache = SaliencyCache::new(backend);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn cache(&self) -> &SaliencyCache {
        &self.cache
    }

    /// Decode the configured inputs and run the optimization.
    pub async fn run(&self) -> WorkerResult<RunSummary> {
        let run_id = RunId::new();
        let variants = load_variants(&self.config.inputs).await?;
        let run_dir = self.config.work_dir.join(run_id.as_str());

        let mut videos = Vec::with_capacity(variants.len());
        for variant in &variants {
            info!(path = %variant.path.display(), qp = variant.qp, "Decoding variant");
            videos.push(decode_variant(variant, &run_dir).await?.frames);
        }

        let result = self.process(run_id, variants, videos).await;

        if !self.config.keep_frames {
            if let Err(e) = tokio::fs::remove_dir_all(&run_dir).await {
                warn!(dir = %run_dir.display(), error = %e, "Failed to remove decoded frames");
            }
        }
        result
    }

    /// Run the optimization on already decoded variants.
    ///
    /// `variants` and `videos` are parallel and sorted by ascending size.
    pub async fn process(
        &self,
        run_id: RunId,
        variants: Vec<QualityVariant>,
        videos: Vec<Vec<Frame>>,
    ) -> WorkerResult<RunSummary> {
        let logger = RunLogger::new(&run_id, self.config.strategy);
        let span = logger.create_span();
        let start = Instant::now();

        let result = self
            .process_inner(run_id, &logger, variants, videos)
            .instrument(span)
            .await;
        crate::metrics::record_run(
            self.config.strategy.as_str(),
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        if let Err(e) = &result {
            logger.log_error(&e.to_string());
        }
        result
    }

    async fn process_inner(
        &self,
        run_id: RunId,
        logger: &RunLogger,
        variants: Vec<QualityVariant>,
        videos: Vec<Vec<Frame>>,
    ) -> WorkerResult<RunSummary> {
        let started_at = Utc::now();
        let start = Instant::now();
        let strategy = self.config.strategy;
        let mask_config = self.config.mask.clone();

        if variants.len() != videos.len() {
            return Err(WorkerError::processing_failed(format!(
                "{} variants but {} decoded videos",
                variants.len(),
                videos.len()
            )));
        }
        let (lowest, best) = match (variants.first(), variants.last()) {
            (Some(lowest), Some(best)) => (lowest.clone(), best.clone()),
            _ => return Err(WorkerError::config_error("no input variants")),
        };

        let (width, height, num_frames) = validate_shapes(&videos)?;
        mask_config.validate_for(width, height)?;
        let grid = TileGrid::new(width, height, mask_config.tile_size)?;
        logger.log_start(&format!(
            "{} variants, {} frames of {}x{}, {}x{} tiles",
            variants.len(),
            num_frames,
            width,
            height,
            grid.cols(),
            grid.rows()
        ));

        let ctx = self.config.device;
        ctx.log();

        // Fail on bad QPs before spending time on inference
        let deltas = QualityDeltas::from_qps(best.qp, lowest.qp, self.config.base_qp)?;
        let videos = Arc::new(videos);

        let store = match &self.config.ground_truth {
            Some(path) => ResultsStore::with_path(path),
            None => ResultsStore::new(),
        };
        let needs_ground_truth = !strategy.uses_saliency();
        let must_detect = needs_ground_truth
            && !tokio::fs::try_exists(store.path_for(&best.path)).await?;
        let detector = if strategy.requires_inference() || must_detect {
            Some(self.detector(ctx)?)
        } else {
            None
        };

        let ground_truth = if needs_ground_truth {
            let ground_truth = store
                .load_or_compute(&best.path, || {
                    compute_ground_truth(detector.clone(), Arc::clone(&videos), ctx)
                })
                .await?;
            logger.log_progress(&format!(
                "ground truth has {} detections over {} frames",
                ground_truth.total_detections(),
                ground_truth.len()
            ));
            ground_truth
        } else {
            DetectionResults::new(strategy.as_str())
        };

        let saliency = if strategy.uses_saliency() {
            let key = video_key(&best.path)?;
            let maps = self
                .cache
                .load(&key, mask_config.tile_size)
                .await
                .ok_or_else(|| {
                    WorkerError::config_error(format!(
                        "no cached saliency maps for {} at tile size {}",
                        key, mask_config.tile_size
                    ))
                })?;
            if maps.len() < num_frames {
                logger.log_warning(&format!(
                    "saliency covers {} of {} frames",
                    maps.len(),
                    num_frames
                ));
            }
            Some(maps)
        } else {
            None
        };

        let knots = blend_knots(&bandwidth_weights(&variants));
        debug!(?knots, "Blend knots");

        let generator = GeneratorBuilder::for_strategy(strategy)
            .saliency_selection(SaliencySelection::TopPercent(self.config.saliency_percent))
            .build()?;
        let budget = self
            .config
            .timeout
            .map(RunBudget::with_timeout)
            .unwrap_or_else(RunBudget::unlimited);

        let generation_config = mask_config.clone();
        let generation_videos = Arc::clone(&videos);
        let masks = tokio::task::spawn_blocking(move || {
            let input = MaskInput {
                grid,
                config: &generation_config,
                num_frames,
                ground_truth: &ground_truth,
                variants: generation_videos.as_slice(),
                knots: &knots,
                detector: detector.as_deref(),
                saliency: saliency.as_ref(),
                ctx,
                budget,
            };
            generator.generate(&input)
        })
        .await
        .map_err(|e| WorkerError::processing_failed(format!("mask generation task failed: {}", e)))??;

        let bits: Vec<_> = masks
            .iter()
            .map(|mask| binarize(mask, mask_config.binarize_threshold))
            .collect();
        let mean_coverage = if bits.is_empty() {
            0.0
        } else {
            bits.iter().map(coverage).sum::<f64>() / bits.len() as f64
        };
        accmask_media::metrics::set_mask_coverage(strategy.as_str(), mean_coverage);

        let encoder = RoiEncoder::new(self.config.roi_layout, deltas);
        let output = self.config.output.clone();
        let write_path = output.clone();
        tokio::task::spawn_blocking(move || write_roi_file(&write_path, &bits, &encoder))
            .await
            .map_err(|e| WorkerError::processing_failed(format!("ROI write task failed: {}", e)))??;

        let duration_secs = start.elapsed().as_secs_f64();
        logger.log_completion(&format!(
            "wrote {} ({:.1}% high quality) in {:.1}s",
            output.display(),
            mean_coverage * 100.0,
            duration_secs
        ));

        Ok(RunSummary {
            run_id,
            strategy: strategy.as_str().to_string(),
            frames: num_frames,
            grid: grid.shape(),
            coverage: mean_coverage,
            output,
            started_at,
            duration_secs,
        })
    }

    fn detector(&self, ctx: ExecutionContext) -> WorkerResult<Arc<dyn DetectionProvider>> {
        if let Some(detector) = &self.detector {
            return Ok(Arc::clone(detector));
        }
        let config = ObjectDetectorConfig {
            model_path: self.config.model_path.clone(),
            ..ObjectDetectorConfig::default()
        };
        Ok(Arc::new(ObjectDetector::new(config, ctx)?))
    }
}

/// Cache key of a video: the file stem of its best variant.
fn video_key(path: &Path) -> WorkerResult<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| WorkerError::config_error(format!("bad video name: {}", path.display())))
}

/// Detect on every frame of the best variant.
async fn compute_ground_truth(
    detector: Option<Arc<dyn DetectionProvider>>,
    videos: Arc<Vec<Vec<Frame>>>,
    ctx: ExecutionContext,
) -> WorkerResult<DetectionResults> {
    let detector = detector
        .ok_or_else(|| WorkerError::processing_failed("ground truth needs a detector"))?;

    tokio::task::spawn_blocking(move || -> WorkerResult<DetectionResults> {
        let frames = videos
            .last()
            .ok_or_else(|| WorkerError::config_error("no input variants"))?;
        let mut results = DetectionResults::new(detector.name());
        for (fid, outcome) in detector.detect_batch(frames, &ctx).into_iter().enumerate() {
            results.insert(fid as u32, outcome?);
        }
        Ok(results)
    })
    .await
    .map_err(|e| WorkerError::processing_failed(format!("ground truth task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_key() {
        assert_eq!(video_key(Path::new("/v/dashcam_qp_24.mp4")).unwrap(), "dashcam_qp_24");
        assert!(video_key(Path::new("/")).is_err());
    }
}
