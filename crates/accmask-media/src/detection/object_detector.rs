//! Object detection using a YOLOv8 ONNX model.
//!
//! The session is built once for the `ExecutionContext` chosen at startup:
//! - CUDA when the `cuda` feature is enabled and a CUDA context is requested
//! - CoreML on macOS
//! - CPU otherwise

use std::path::Path;
use std::sync::Mutex;

use accmask_models::{BoundingBox, Detection, FrameDetections};
use image::DynamicImage;
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::detection::execution::ExecutionContext;
use crate::detection::provider::DetectionProvider;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

const NUM_CLASSES: usize = 80;
const NUM_CANDIDATES: usize = 8400;

/// Configuration for object detection.
#[derive(Debug, Clone)]
pub struct ObjectDetectorConfig {
    /// Path to ONNX model file
    pub model_path: String,
    /// Candidates scoring below this are dropped before NMS
    pub score_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
}

impl Default for ObjectDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/object_detection/yolov8n.onnx".to_string(),
            score_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// YOLOv8 detector backed by ONNX Runtime.
pub struct ObjectDetector {
    session: Mutex<Session>,
    config: ObjectDetectorConfig,
    ctx: ExecutionContext,
}

impl ObjectDetector {
    /// Create a new object detector placed on `ctx`.
    ///
    /// Returns error if the model file doesn't exist, cannot be loaded, or the
    /// requested execution provider is unavailable.
    pub fn new(config: ObjectDetectorConfig, ctx: ExecutionContext) -> MediaResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(MediaError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(create_session(model_path, &ctx)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            device = %ctx,
            "Object detector initialized"
        );

        Ok(Self { session, config, ctx })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ObjectDetectorConfig {
        &self.config
    }

    /// Preprocess image for YOLOv8 inference.
    ///
    /// - Resize to model input size
    /// - Normalize pixel values to [0, 1]
    /// - Convert to NCHW format (batch, channels, height, width)
    fn preprocess(&self, img: &DynamicImage) -> MediaResult<Value> {
        let input_size = self.config.input_size;
        let resized = img.resize_exact(
            input_size,
            input_size,
            image::imageops::FilterType::Triangle,
        );

        let rgb = resized.to_rgb8();
        let (w, h) = (input_size as usize, input_size as usize);
        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);

        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = rgb.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
    }

    /// Run ONNX inference.
    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 84, 8400]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.iter().copied().collect())
    }

    /// Decode YOLOv8 output into pixel-space detections.
    ///
    /// Output layout: `[1, 84, 8400]`, 84 = 4 box values (cx, cy, w, h) plus
    /// 80 class scores.
    fn postprocess(&self, outputs: &[f32], width: u32, height: u32) -> MediaResult<FrameDetections> {
        let num_features = 4 + NUM_CLASSES;
        if outputs.len() != num_features * NUM_CANDIDATES {
            return Err(MediaError::detection_failed(format!(
                "Unexpected output size: expected {}, got {}",
                num_features * NUM_CANDIDATES,
                outputs.len()
            )));
        }

        let output_array = Array::from_shape_vec((num_features, NUM_CANDIDATES), outputs.to_vec())
            .map_err(|e| MediaError::internal(format!("Failed to reshape output: {}", e)))?;
        let transposed = output_array.t();

        let input_size = self.config.input_size as f64;
        let scale_w = width as f64 / input_size;
        let scale_h = height as f64 / input_size;
        let (frame_w, frame_h) = (width as f64, height as f64);

        let mut candidates = Vec::new();
        for i in 0..NUM_CANDIDATES {
            let (best_class, best_score) = (0..NUM_CLASSES)
                .map(|c| (c, transposed[[i, 4 + c]]))
                .fold((0usize, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });

            if best_score < self.config.score_threshold {
                continue;
            }

            let cx = transposed[[i, 0]] as f64 * scale_w;
            let cy = transposed[[i, 1]] as f64 * scale_h;
            let w = transposed[[i, 2]] as f64 * scale_w;
            let h = transposed[[i, 3]] as f64 * scale_h;

            let x1 = (cx - w / 2.0).clamp(0.0, frame_w);
            let y1 = (cy - h / 2.0).clamp(0.0, frame_h);
            let x2 = (cx + w / 2.0).clamp(0.0, frame_w);
            let y2 = (cy + h / 2.0).clamp(0.0, frame_h);

            candidates.push(Detection::new(
                BoundingBox::from_corners(x1, y1, x2, y2),
                best_score as f64,
                best_class as u32,
            ));
        }

        Ok(non_maximum_suppression(candidates, self.config.nms_threshold as f64))
    }
}

impl DetectionProvider for ObjectDetector {
    fn detect(&self, frame: &Frame, ctx: &ExecutionContext) -> MediaResult<FrameDetections> {
        if *ctx != self.ctx {
            return Err(MediaError::internal(format!(
                "Detector session placed on {} but called with {}",
                self.ctx, ctx
            )));
        }

        let (width, height) = frame.dimensions();
        let input = self.preprocess(&frame.to_dynamic())?;
        let outputs = self.run_inference(input)?;
        let detections = self.postprocess(&outputs, width, height)?;

        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    fn name(&self) -> &str {
        Path::new(&self.config.model_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("yolov8")
    }
}

/// Remove overlapping same-class detections, keeping the highest scores.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, nms_threshold: f64) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.label == candidate.label && kept.bbox.iou(&candidate.bbox) > nms_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }

    keep
}

/// Create an ONNX Runtime session on the requested execution provider.
fn create_session(model_path: &Path, ctx: &ExecutionContext) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    let builder = match ctx {
        ExecutionContext::Cpu => builder,

        #[cfg(feature = "cuda")]
        ExecutionContext::Cuda { device_id } => {
            use ort::execution_providers::CUDAExecutionProvider;
            builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(*device_id)
                    .build()])
                .map_err(|e| MediaError::internal(format!("CUDA execution provider unavailable: {}", e)))?
        }

        #[cfg(not(feature = "cuda"))]
        ExecutionContext::Cuda { .. } => {
            return Err(MediaError::internal(
                "CUDA execution requested but accmask-media was built without the `cuda` feature",
            ));
        }

        #[cfg(target_os = "macos")]
        ExecutionContext::CoreMl => {
            use ort::execution_providers::CoreMLExecutionProvider;
            builder
                .with_execution_providers([CoreMLExecutionProvider::default().build()])
                .map_err(|e| MediaError::internal(format!("CoreML execution provider unavailable: {}", e)))?
        }

        #[cfg(not(target_os = "macos"))]
        ExecutionContext::CoreMl => {
            return Err(MediaError::internal("CoreML execution is only available on macOS"));
        }
    };

    info!(device = %ctx, "Loading object detection model");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}
