//! Detection collaborator seam.
//!
//! The optimizer treats the object detector as a black box behind
//! [`DetectionProvider`]. This module provides:
//!
//! | Item | Role |
//! |------|------|
//! | `DetectionProvider` | Trait the region grower calls once per hybrid frame |
//! | `ObjectDetector` | Bundled YOLOv8 ONNX implementation |
//! | `ExecutionContext` | Device placement chosen once at startup |
//! | `matching` | Ground truth vs. inference matching by label, score and IoU |

pub mod execution;
pub mod matching;
pub mod object_detector;
pub mod provider;

pub use execution::ExecutionContext;
pub use matching::{filter_by_confidence, undetected_indices, MatchThresholds};
pub use object_detector::{ObjectDetector, ObjectDetectorConfig, COCO_CLASSES};
pub use provider::DetectionProvider;
