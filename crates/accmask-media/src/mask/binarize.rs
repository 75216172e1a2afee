//! Mask binarization.

use ndarray::Array2;

use crate::mask::synth::TileMask;

/// Per-tile quality selection: `1` high quality, `0` low quality.
pub type BinaryMask = Array2<u8>;

/// Snap continuous weights to `{0, 1}`.
///
/// A tile is `1` iff its weight is strictly greater than `threshold`. With the
/// default threshold equal to the mask baseline, any coverage at all selects
/// high quality.
pub fn binarize(mask: &TileMask, threshold: f32) -> BinaryMask {
    mask.mapv(|w| u8::from(w > threshold))
}

/// Fraction of tiles selected for high quality.
pub fn coverage(mask: &BinaryMask) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|v| **v == 1).count() as f64 / mask.len() as f64
}
