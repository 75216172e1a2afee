//! Provider trait wrapping detection implementations.

use accmask_models::FrameDetections;

use crate::detection::execution::ExecutionContext;
use crate::error::MediaResult;
use crate::frame::Frame;

/// Object detection provider.
///
/// Implementations must be callable from several rayon workers at once; the
/// region grower scores all frames of an iteration in parallel.
pub trait DetectionProvider: Send + Sync {
    /// Detect objects in one frame.
    ///
    /// # Returns
    /// Detections in pixel coordinates of `frame`.
    fn detect(&self, frame: &Frame, ctx: &ExecutionContext) -> MediaResult<FrameDetections>;

    /// Detect objects in a batch of frames.
    ///
    /// The default runs frames one at a time; batched backends override it.
    fn detect_batch(
        &self,
        frames: &[Frame],
        ctx: &ExecutionContext,
    ) -> Vec<MediaResult<FrameDetections>> {
        frames.iter().map(|frame| self.detect(frame, ctx)).collect()
    }

    /// Provider name, used as the application name of produced results.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use accmask_models::{BoundingBox, Detection};

    struct FixedProvider;

    impl DetectionProvider for FixedProvider {
        fn detect(&self, frame: &Frame, _ctx: &ExecutionContext) -> MediaResult<FrameDetections> {
            let (w, h) = frame.dimensions();
            Ok(vec![Detection::new(
                BoundingBox::new(0.0, 0.0, w as f64, h as f64),
                1.0,
                0,
            )])
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_default_batch_runs_every_frame() {
        let frames = vec![Frame::filled(8, 8, 0.0), Frame::filled(16, 8, 0.0)];
        let results = FixedProvider.detect_batch(&frames, &ExecutionContext::Cpu);

        assert_eq!(results.len(), 2);
        let second = results[1].as_ref().unwrap();
        assert_eq!(second[0].bbox.width, 16.0);
    }
}
