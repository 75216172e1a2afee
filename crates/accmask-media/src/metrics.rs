//! Optimization metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const REGIONS_GROWN_TOTAL: &str = "accmask_regions_grown_total";
    pub const REGIONS_RESET_TOTAL: &str = "accmask_regions_reset_total";
    pub const INFERENCE_FAILURES_TOTAL: &str = "accmask_inference_failures_total";
    pub const ITERATION_SECONDS: &str = "accmask_iteration_seconds";
    pub const ACTIVE_REGIONS: &str = "accmask_active_regions";
    pub const MASK_COVERAGE: &str = "accmask_mask_coverage";
}

/// Record one finished grower iteration.
pub fn record_iteration(grown: usize, reset: usize, failed: usize, duration_secs: f64) {
    counter!(names::REGIONS_GROWN_TOTAL).increment(grown as u64);
    counter!(names::REGIONS_RESET_TOTAL).increment(reset as u64);
    counter!(names::INFERENCE_FAILURES_TOTAL).increment(failed as u64);
    histogram!(names::ITERATION_SECONDS).record(duration_secs);
}

/// Record the number of regions currently covering area.
pub fn set_active_regions(count: usize) {
    gauge!(names::ACTIVE_REGIONS).set(count as f64);
}

/// Record the high-quality tile fraction of a finished mask.
pub fn set_mask_coverage(strategy: &str, fraction: f64) {
    let labels = [("strategy", strategy.to_string())];
    gauge!(names::MASK_COVERAGE, &labels).set(fraction);
}
