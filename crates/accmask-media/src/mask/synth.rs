//! Mask synthesis: regions to tile weights, tile weights to hybrid frames.

use ndarray::{s, Array2, Array3, Zip};

use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, CHANNELS};
use crate::mask::regions::RegionSet;
use crate::tile::TileGrid;

/// Continuous per-tile weights in `[0, 1]`, shape `(rows, cols)`.
pub type TileMask = Array2<f32>;

/// Weight of a tile that must be encoded at the highest quality.
pub const FULL_WEIGHT: f32 = 1.0;

/// All-ones placeholder mask for a grid.
pub fn full_mask(grid: &TileGrid) -> TileMask {
    TileMask::from_elem(grid.shape(), FULL_WEIGHT)
}

/// Rasterize a frame's regions into a fresh tile mask.
pub fn rasterize(grid: &TileGrid, regions: &RegionSet, baseline: f32) -> TileMask {
    let mut mask = TileMask::zeros(grid.shape());
    rasterize_into(&mut mask, grid, regions, baseline);
    mask
}

/// Rasterize in place, overwriting every tile.
///
/// Tiles touched by an active region get [`FULL_WEIGHT`]; the rest get
/// `baseline`. Overlapping regions combine by maximum.
pub fn rasterize_into(mask: &mut TileMask, grid: &TileGrid, regions: &RegionSet, baseline: f32) {
    debug_assert_eq!(mask.dim(), grid.shape());
    mask.fill(baseline.clamp(0.0, FULL_WEIGHT));

    for region in regions.regions().iter().filter(|r| r.is_active()) {
        for (row, col) in grid.tiles_for_rect(&region.rect()).iter() {
            // max over regions, saturating at full weight
            if let Some(weight) = mask.get_mut((row, col)) {
                *weight = FULL_WEIGHT;
            }
        }
    }
}

/// Blend positions of quality variants.
///
/// `weights` are bandwidth weights in ascending order. They are rescaled so
/// the lowest variant sits at 0 and the highest at 1. Equal weights are
/// spread evenly instead.
pub fn blend_knots(weights: &[f64]) -> Vec<f32> {
    match weights {
        [] => Vec::new(),
        [_] => vec![FULL_WEIGHT],
        _ => {
            let lo = weights[0];
            let hi = weights[weights.len() - 1];
            let span = hi - lo;
            if span <= f64::EPSILON {
                let last = (weights.len() - 1) as f32;
                return (0..weights.len()).map(|i| i as f32 / last).collect();
            }
            weights.iter().map(|w| ((w - lo) / span) as f32).collect()
        }
    }
}

/// Compose a hybrid frame from quality variants and a tile mask.
///
/// `variants` are ordered by ascending bandwidth and `knots` come from
/// [`blend_knots`]. Each pixel reads the weight of its own tile, so tile
/// boundaries stay sharp.
pub fn hybridize(
    grid: &TileGrid,
    variants: &[&Frame],
    knots: &[f32],
    mask: &TileMask,
) -> MediaResult<Frame> {
    let first = variants
        .first()
        .ok_or_else(|| MediaError::internal("hybridize needs at least one variant"))?;
    if knots.len() != variants.len() {
        return Err(MediaError::internal(format!(
            "{} blend knots for {} variants",
            knots.len(),
            variants.len()
        )));
    }
    if mask.dim() != grid.shape() {
        return Err(MediaError::malformed_mask(
            "tile mask does not match grid",
            format!("{:?}", grid.shape()),
            format!("{:?}", mask.dim()),
        ));
    }
    for variant in variants {
        if variant.dimensions() != (grid.width(), grid.height()) {
            return Err(MediaError::shape_mismatch(format!(
                "variant is {}x{}, grid expects {}x{}",
                variant.width(),
                variant.height(),
                grid.width(),
                grid.height()
            )));
        }
    }
    if variants.len() == 1 {
        return Ok((*first).clone());
    }

    let ts = grid.tile_size() as usize;
    let height = grid.height() as usize;
    let width = grid.width() as usize;
    let mut out = Array3::<f32>::zeros((height, width, CHANNELS));

    for row in 0..grid.rows() {
        for col in 0..grid.cols() {
            let (lower, upper, alpha) = segment(knots, mask[(row, col)]);
            let ys = row * ts..(row + 1) * ts;
            let xs = col * ts..(col + 1) * ts;

            let low = variants[lower].data().slice(s![ys.clone(), xs.clone(), ..]);
            let high = variants[upper].data().slice(s![ys.clone(), xs.clone(), ..]);
            Zip::from(out.slice_mut(s![ys, xs, ..]))
                .and(&low)
                .and(&high)
                .for_each(|o, &l, &h| *o = (1.0 - alpha) * l + alpha * h);
        }
    }

    Frame::from_array(out)
}

/// Adjacent knot pair bracketing `weight` and the position inside it.
fn segment(knots: &[f32], weight: f32) -> (usize, usize, f32) {
    let weight = weight.clamp(0.0, FULL_WEIGHT);
    let last = knots.len() - 1;

    for i in 0..last {
        let (lo, hi) = (knots[i], knots[i + 1]);
        if weight <= hi || i + 1 == last {
            let span = hi - lo;
            let alpha = if span <= f32::EPSILON {
                1.0
            } else {
                ((weight - lo) / span).clamp(0.0, 1.0)
            };
            return (i, i + 1, alpha);
        }
    }
    (last, last, 1.0)
}
