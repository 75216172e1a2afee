//! Feedback-driven region grower.
//!
//! Each iteration rasterizes the current regions, composes a hybrid frame per
//! frame id, runs detection on it and compares against the ground truth.
//! Ground-truth objects the detector missed get their region grown by
//! `delta`; on the last iteration they are reset to zero instead. Regions
//! whose object was recovered are left untouched.
//!
//! Iterations are strictly sequential. Within one iteration frames are scored
//! in parallel against a read-only view of the regions, and all updates are
//! applied together once every frame is scored.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use accmask_models::{Detection, FrameDetections, MaskConfig};

use crate::detection::matching::{undetected_indices, MatchThresholds};
use crate::detection::{DetectionProvider, ExecutionContext};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::mask::regions::RegionTracker;
use crate::mask::synth::{full_mask, hybridize, rasterize, rasterize_into, TileMask};
use crate::metrics;
use crate::tile::TileGrid;

/// Position of the grower in its iteration schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowerState {
    /// Iterations `0..K-1`: missed regions grow
    Growing,
    /// Iteration `K-1`: missed regions reset to zero
    Finalizing,
    /// Regions are frozen
    Done,
}

/// Scoring result of one frame in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Indices of ground-truth regions the detector missed
    Scored { undetected: Vec<usize> },
    /// Inference returned nothing; the frame is left as is
    Empty,
    /// Inference failed; the frame is left as is
    Failed,
}

impl FrameOutcome {
    /// Score an inference result against the frame's ground truth.
    pub fn from_inference(
        ground_truth: &[Detection],
        inference: MediaResult<FrameDetections>,
        thresholds: &MatchThresholds,
    ) -> Self {
        match inference {
            Ok(detections) if detections.is_empty() => FrameOutcome::Empty,
            Ok(detections) => FrameOutcome::Scored {
                undetected: undetected_indices(ground_truth, &detections, thresholds),
            },
            Err(_) => FrameOutcome::Failed,
        }
    }
}

/// Caller-level time limit, checked between iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunBudget {
    pub deadline: Option<Instant>,
}

impl RunBudget {
    /// No time limit.
    pub fn unlimited() -> Self {
        Self { deadline: None }
    }

    /// Limit the run to `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// Region changes made by one transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationSummary {
    pub grown: usize,
    pub reset: usize,
    pub failed: usize,
    pub empty: usize,
}

/// Iteration state machine over a run's region tracker.
#[derive(Debug, Clone)]
pub struct RegionGrower {
    config: MaskConfig,
    tracker: RegionTracker,
    iteration: u32,
    state: GrowerState,
}

impl RegionGrower {
    /// Create a grower in its initial state.
    pub fn new(config: MaskConfig, tracker: RegionTracker) -> MediaResult<Self> {
        config.validate()?;
        let state = if config.num_iterations == 1 {
            GrowerState::Finalizing
        } else {
            GrowerState::Growing
        };

        Ok(Self {
            config,
            tracker,
            iteration: 0,
            state,
        })
    }

    pub fn state(&self) -> GrowerState {
        self.state
    }

    /// Number of transitions applied so far.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    pub fn tracker(&self) -> &RegionTracker {
        &self.tracker
    }

    pub fn into_tracker(self) -> RegionTracker {
        self.tracker
    }

    /// Apply one iteration's outcomes, indexed by frame id.
    ///
    /// No-op once the grower is done.
    pub fn apply(&mut self, outcomes: &[FrameOutcome]) -> IterationSummary {
        let mut summary = IterationSummary::default();
        if self.state == GrowerState::Done {
            return summary;
        }

        for (fid, outcome) in outcomes.iter().enumerate() {
            let Some(set) = self.tracker.frame_mut(fid) else {
                warn!(fid, "Outcome for unknown frame ignored");
                continue;
            };

            match outcome {
                FrameOutcome::Failed => summary.failed += 1,
                FrameOutcome::Empty => summary.empty += 1,
                FrameOutcome::Scored { undetected } => match self.state {
                    GrowerState::Growing => summary.grown += set.grow(undetected, self.config.delta),
                    GrowerState::Finalizing => summary.reset += set.reset(undetected),
                    GrowerState::Done => {}
                },
            }
        }

        self.iteration += 1;
        match self.state {
            GrowerState::Finalizing => self.finish(),
            GrowerState::Growing if self.iteration + 1 >= self.config.num_iterations => {
                self.state = GrowerState::Finalizing;
            }
            _ => {}
        }

        summary
    }

    /// Freeze the regions as they stand without applying resets.
    ///
    /// Used when the run budget fires before the schedule completes. No-op
    /// once the grower is done.
    pub fn finalize(&mut self) {
        if self.state != GrowerState::Done {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.tracker.freeze_all();
        self.state = GrowerState::Done;
    }

    /// Rasterize the current regions of every frame.
    pub fn masks(&self, grid: &TileGrid) -> Vec<TileMask> {
        self.tracker
            .frames()
            .iter()
            .map(|set| rasterize(grid, set, self.config.baseline_weight))
            .collect()
    }

    /// Drive the grower to completion and return the final masks.
    ///
    /// `variants` holds every quality variant's frames in ascending bandwidth
    /// order, and `knots` their blend positions.
    pub fn run(
        &mut self,
        grid: &TileGrid,
        variants: &[Vec<Frame>],
        knots: &[f32],
        detector: &dyn DetectionProvider,
        ctx: &ExecutionContext,
        budget: RunBudget,
    ) -> MediaResult<Vec<TileMask>> {
        let num_frames = self.tracker.len();
        if variants.is_empty() {
            return Err(MediaError::shape_mismatch("no quality variants"));
        }
        if let Some((idx, v)) = variants.iter().enumerate().find(|(_, v)| v.len() != num_frames) {
            return Err(MediaError::shape_mismatch(format!(
                "variant {} has {} frames, regions cover {}",
                idx,
                v.len(),
                num_frames
            )));
        }

        let thresholds = MatchThresholds::from(&self.config);
        let mut masks = vec![full_mask(grid); num_frames];

        info!(
            frames = num_frames,
            regions = self.tracker.region_count(),
            iterations = self.config.num_iterations,
            delta = self.config.delta,
            detector = detector.name(),
            device = %ctx,
            "Starting region growing"
        );

        while self.state != GrowerState::Done {
            if budget.is_exhausted() {
                warn!(iteration = self.iteration, "Run budget exhausted, keeping current regions");
                self.finalize();
                break;
            }

            let started = Instant::now();
            let iteration = self.iteration;

            for (mask, set) in masks.iter_mut().zip(self.tracker.frames()) {
                rasterize_into(mask, grid, set, self.config.baseline_weight);
            }

            let tracker = &self.tracker;
            let masks_ref = &masks;
            let outcomes: Vec<FrameOutcome> = (0..num_frames)
                .into_par_iter()
                .map(|fid| {
                    let Some(set) = tracker.frame(fid) else {
                        return FrameOutcome::Failed;
                    };
                    if set.is_empty() {
                        return FrameOutcome::Scored { undetected: Vec::new() };
                    }

                    let frames: Vec<&Frame> = variants.iter().map(|v| &v[fid]).collect();
                    let result = hybridize(grid, &frames, knots, &masks_ref[fid])
                        .and_then(|hybrid| detector.detect(&hybrid, ctx));
                    if let Err(e) = &result {
                        warn!(iteration, fid, error = %e, "Inference failed, frame left unchanged");
                    }
                    FrameOutcome::from_inference(set.ground_truth(), result, &thresholds)
                })
                .collect();

            let phase = self.state;
            let summary = self.apply(&outcomes);
            let elapsed = started.elapsed().as_secs_f64();

            metrics::record_iteration(summary.grown, summary.reset, summary.failed, elapsed);
            metrics::set_active_regions(self.tracker.active_count());
            debug!(
                iteration,
                phase = ?phase,
                grown = summary.grown,
                reset = summary.reset,
                failed = summary.failed,
                empty = summary.empty,
                elapsed_secs = elapsed,
                "Iteration complete"
            );
        }

        info!(
            iterations = self.iteration,
            active_regions = self.tracker.active_count(),
            "Region growing finished"
        );

        Ok(self.masks(grid))
    }
}
