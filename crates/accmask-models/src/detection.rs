//! Detection results produced by an object detector.
//!
//! The same types carry ground truth (read once, immutable for a run) and
//! per-iteration inference output on hybrid frames.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// A single detected object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Bounding box in pixel coordinates
    pub bbox: BoundingBox,
    /// Detection confidence score (0.0-1.0)
    pub score: f64,
    /// Class label (COCO class id for the bundled detector)
    pub label: u32,
}

impl Detection {
    /// Create a new detection.
    pub fn new(bbox: BoundingBox, score: f64, label: u32) -> Self {
        Self { bbox, score, label }
    }
}

/// Detections for one frame.
pub type FrameDetections = Vec<Detection>;

/// Detection results for a whole video, keyed by frame id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResults {
    /// Name of the application (detector) that produced the results
    pub application: String,
    /// Per-frame detections
    #[serde(default)]
    pub frames: BTreeMap<u32, FrameDetections>,
}

impl DetectionResults {
    /// Create empty results for an application.
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            frames: BTreeMap::new(),
        }
    }

    /// Record the detections of one frame, replacing any previous entry.
    pub fn insert(&mut self, fid: u32, detections: FrameDetections) {
        self.frames.insert(fid, detections);
    }

    /// Detections for a frame; frames without an entry have none.
    pub fn frame(&self, fid: u32) -> &[Detection] {
        self.frames.get(&fid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of frames with an entry.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total number of detections across all frames.
    pub fn total_detections(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }
}
