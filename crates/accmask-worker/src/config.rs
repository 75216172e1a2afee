//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use accmask_media::detection::ExecutionContext;
use accmask_media::mask::DEFAULT_SALIENCY_PERCENT;
use accmask_models::{MaskConfig, MaskStrategy, RoiLayout, DEFAULT_BASE_QP};

use crate::error::{WorkerError, WorkerResult};

/// Configuration of one mask optimization run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Encoded variants of the same video, any order
    pub inputs: Vec<PathBuf>,
    /// Ground truth results file; derived from the best variant when unset
    pub ground_truth: Option<PathBuf>,
    /// ROI control stream output path
    pub output: PathBuf,
    /// Detector ONNX model
    pub model_path: String,
    pub strategy: MaskStrategy,
    pub mask: MaskConfig,
    /// QP the encoder applies the ROI deltas to
    pub base_qp: i32,
    pub roi_layout: RoiLayout,
    pub device: ExecutionContext,
    /// Scratch directory for decoded frames
    pub work_dir: PathBuf,
    /// Saliency cache root; an in-memory cache is used when unset
    pub cache_dir: Option<PathBuf>,
    /// Wall-clock limit for region growing
    pub timeout: Option<Duration>,
    /// Share of tiles kept by the saliency strategy
    pub saliency_percent: f64,
    /// Keep decoded frames after the run
    pub keep_frames: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            ground_truth: None,
            output: PathBuf::from("roi.bin"),
            model_path: "models/object_detection/yolov8n.onnx".to_string(),
            strategy: MaskStrategy::default(),
            mask: MaskConfig::default(),
            base_qp: DEFAULT_BASE_QP,
            roi_layout: RoiLayout::default(),
            device: ExecutionContext::default(),
            work_dir: PathBuf::from("/tmp/accmask"),
            cache_dir: None,
            timeout: None,
            saliency_percent: DEFAULT_SALIENCY_PERCENT,
            keep_frames: false,
        }
    }
}

impl RunConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    ///
    /// Numeric settings that fail to parse fall back to their defaults.
    /// Inputs, strategy, layout and device must be valid when present.
    pub fn from_lookup<F>(lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let inputs: Vec<PathBuf> = lookup("ACCMASK_INPUTS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        if inputs.is_empty() {
            return Err(WorkerError::config_error("ACCMASK_INPUTS lists no videos"));
        }

        let mask = MaskConfig {
            tile_size: parse_or(&lookup, "ACCMASK_TILE_SIZE", defaults.mask.tile_size),
            num_iterations: parse_or(&lookup, "ACCMASK_NUM_ITERATIONS", defaults.mask.num_iterations),
            delta: parse_or(&lookup, "ACCMASK_DELTA", defaults.mask.delta),
            confidence_threshold: parse_or(
                &lookup,
                "ACCMASK_CONFIDENCE_THRESHOLD",
                defaults.mask.confidence_threshold,
            ),
            iou_threshold: parse_or(&lookup, "ACCMASK_IOU_THRESHOLD", defaults.mask.iou_threshold),
            baseline_weight: parse_or(&lookup, "ACCMASK_BASELINE_WEIGHT", defaults.mask.baseline_weight),
            binarize_threshold: parse_or(
                &lookup,
                "ACCMASK_BINARIZE_THRESHOLD",
                defaults.mask.binarize_threshold,
            ),
        };
        mask.validate()?;

        Ok(Self {
            inputs,
            ground_truth: lookup("ACCMASK_GROUND_TRUTH").map(PathBuf::from),
            output: lookup("ACCMASK_OUTPUT").map(PathBuf::from).unwrap_or(defaults.output),
            model_path: lookup("ACCMASK_MODEL_PATH").unwrap_or(defaults.model_path),
            strategy: parse_strict(&lookup, "ACCMASK_STRATEGY", defaults.strategy)?,
            mask,
            base_qp: parse_or(&lookup, "ACCMASK_BASE_QP", defaults.base_qp),
            roi_layout: parse_strict(&lookup, "ACCMASK_ROI_LAYOUT", defaults.roi_layout)?,
            device: parse_strict(&lookup, "ACCMASK_DEVICE", defaults.device)?,
            work_dir: lookup("ACCMASK_WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            cache_dir: lookup("ACCMASK_CACHE_DIR").map(PathBuf::from),
            timeout: lookup("ACCMASK_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            saliency_percent: parse_or(&lookup, "ACCMASK_SALIENCY_PERCENT", defaults.saliency_percent),
            keep_frames: lookup("ACCMASK_KEEP_FRAMES")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.keep_frames),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn parse_strict<F, T>(lookup: &F, key: &str, default: T) -> WorkerResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| WorkerError::config_error(format!("{}: {}", key, e))),
        None => Ok(default),
    }
}
