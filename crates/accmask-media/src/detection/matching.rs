//! Ground truth vs. inference matching.
//!
//! A ground-truth detection counts as recovered when an inference detection
//! with the same label, a score at or above the confidence threshold and an
//! IoU at or above the IoU threshold exists. Each inference detection can
//! recover at most one ground-truth detection.

use accmask_models::config::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD};
use accmask_models::{Detection, MaskConfig};

/// Thresholds applied when matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    /// Minimum inference score
    pub confidence: f64,
    /// Minimum IoU with the ground-truth box
    pub iou: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            iou: DEFAULT_IOU_THRESHOLD,
        }
    }
}

impl From<&MaskConfig> for MatchThresholds {
    fn from(config: &MaskConfig) -> Self {
        Self {
            confidence: config.confidence_threshold,
            iou: config.iou_threshold,
        }
    }
}

/// Keep detections whose score reaches `threshold`.
pub fn filter_by_confidence(detections: &[Detection], threshold: f64) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.score >= threshold)
        .copied()
        .collect()
}

/// Indices into `ground_truth` that no inference detection recovers.
///
/// Ground truth is matched in order; each picks the unused candidate with the
/// highest IoU.
pub fn undetected_indices(
    ground_truth: &[Detection],
    inference: &[Detection],
    thresholds: &MatchThresholds,
) -> Vec<usize> {
    let mut used = vec![false; inference.len()];
    let mut undetected = Vec::new();

    for (gt_idx, gt) in ground_truth.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;

        for (inf_idx, candidate) in inference.iter().enumerate() {
            if used[inf_idx] || candidate.label != gt.label || candidate.score < thresholds.confidence {
                continue;
            }

            let iou = gt.bbox.iou(&candidate.bbox);
            if iou < thresholds.iou {
                continue;
            }
            if best.map_or(true, |(_, best_iou)| iou > best_iou) {
                best = Some((inf_idx, iou));
            }
        }

        match best {
            Some((inf_idx, _)) => used[inf_idx] = true,
            None => undetected.push(gt_idx),
        }
    }

    undetected
}

#[cfg(test)]
mod tests {
    use super::*;
    use accmask_models::BoundingBox;

    fn det(x: f64, y: f64, score: f64, label: u32) -> Detection {
        Detection::new(BoundingBox::new(x, y, 10.0, 10.0), score, label)
    }

    #[test]
    fn test_exact_match() {
        let gt = vec![det(0.0, 0.0, 0.9, 1)];
        let inf = vec![det(0.0, 0.0, 0.8, 1)];
        assert!(undetected_indices(&gt, &inf, &MatchThresholds::default()).is_empty());
    }

    #[test]
    fn test_label_score_and_iou_must_all_pass() {
        let gt = vec![det(0.0, 0.0, 0.9, 1)];
        let th = MatchThresholds::default();

        assert_eq!(undetected_indices(&gt, &[det(0.0, 0.0, 0.9, 2)], &th), vec![0]);
        assert_eq!(undetected_indices(&gt, &[det(0.0, 0.0, 0.3, 1)], &th), vec![0]);
        // IoU of a 5px shift on a 10px box is 1/3
        assert_eq!(undetected_indices(&gt, &[det(5.0, 0.0, 0.9, 1)], &th), vec![0]);
    }

    #[test]
    fn test_one_inference_recovers_one_ground_truth() {
        let gt = vec![det(0.0, 0.0, 0.9, 1), det(1.0, 0.0, 0.9, 1)];
        let inf = vec![det(0.0, 0.0, 0.9, 1)];
        assert_eq!(
            undetected_indices(&gt, &inf, &MatchThresholds::default()),
            vec![1]
        );
    }

    #[test]
    fn test_empty_inference_misses_everything() {
        let gt = vec![det(0.0, 0.0, 0.9, 1), det(50.0, 50.0, 0.9, 3)];
        assert_eq!(
            undetected_indices(&gt, &[], &MatchThresholds::default()),
            vec![0, 1]
        );
    }

    #[test]
    fn test_filter_by_confidence() {
        let dets = vec![det(0.0, 0.0, 0.9, 1), det(0.0, 0.0, 0.4, 1), det(0.0, 0.0, 0.5, 1)];
        assert_eq!(filter_by_confidence(&dets, 0.5).len(), 2);
    }
}
