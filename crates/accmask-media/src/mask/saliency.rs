//! Per-tile saliency.
//!
//! A per-pixel importance map (for instance the gradient norm of the detector
//! loss) is pooled into tiles and normalized to `[0, 1]`. The result can be
//! turned into a tile mask by an absolute threshold or by keeping the most
//! salient fraction of tiles.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};
use crate::mask::synth::{TileMask, FULL_WEIGHT};
use crate::tile::TileGrid;

/// Sum a `(height, width)` importance map over each tile.
pub fn pool_tiles(importance: &Array2<f32>, grid: &TileGrid) -> MediaResult<Array2<f32>> {
    let expected = (grid.height() as usize, grid.width() as usize);
    if importance.dim() != expected {
        return Err(MediaError::shape_mismatch(format!(
            "importance map is {:?}, frame is {:?}",
            importance.dim(),
            expected
        )));
    }

    let ts = grid.tile_size() as usize;
    Ok(Array2::from_shape_fn(grid.shape(), |(row, col)| {
        importance
            .slice(ndarray::s![row * ts..(row + 1) * ts, col * ts..(col + 1) * ts])
            .sum()
    }))
}

/// Rescale values to `[0, 1]` in place. A constant map becomes all zeros.
pub fn normalize(values: &mut Array2<f32>) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;
    if !span.is_finite() || span <= f32::EPSILON {
        values.fill(0.0);
        return;
    }
    values.mapv_inplace(|v| (v - min) / span);
}

/// Normalized per-tile saliency of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaliencyMap {
    pub rows: usize,
    pub cols: usize,
    /// Row-major tile values in `[0, 1]`
    pub values: Vec<f32>,
}

impl SaliencyMap {
    /// Pool and normalize a per-pixel importance map.
    pub fn from_importance(importance: &Array2<f32>, grid: &TileGrid) -> MediaResult<Self> {
        let mut pooled = pool_tiles(importance, grid)?;
        normalize(&mut pooled);
        Ok(Self::from_tiles(&pooled))
    }

    /// Wrap already pooled tile values.
    pub fn from_tiles(tiles: &Array2<f32>) -> Self {
        let (rows, cols) = tiles.dim();
        Self {
            rows,
            cols,
            values: tiles.iter().copied().collect(),
        }
    }

    pub fn to_array(&self) -> MediaResult<Array2<f32>> {
        Array2::from_shape_vec((self.rows, self.cols), self.values.clone()).map_err(|_| {
            MediaError::malformed_mask(
                "saliency values do not fill the grid",
                self.rows * self.cols,
                self.values.len(),
            )
        })
    }

    /// Full weight where saliency exceeds `threshold`, `baseline` elsewhere.
    pub fn threshold(&self, threshold: f32, baseline: f32) -> MediaResult<TileMask> {
        Ok(self
            .to_array()?
            .mapv(|v| if v > threshold { FULL_WEIGHT } else { baseline }))
    }

    /// Full weight on the `percent` most salient tiles, `baseline` elsewhere.
    pub fn top_percent(&self, percent: f64, baseline: f32) -> MediaResult<TileMask> {
        let tiles = self.to_array()?;
        let keep = ((percent.clamp(0.0, 100.0) / 100.0) * tiles.len() as f64).ceil() as usize;

        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by(|&a, &b| self.values[b].total_cmp(&self.values[a]));

        let mut mask = TileMask::from_elem(tiles.dim(), baseline);
        for idx in order.into_iter().take(keep) {
            mask[(idx / self.cols, idx % self.cols)] = FULL_WEIGHT;
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid() -> TileGrid {
        TileGrid::new(4, 2, 2).unwrap()
    }

    #[test]
    fn test_pool_tiles_sums_blocks() {
        let importance = array![[1.0_f32, 1.0, 0.0, 0.0], [1.0, 1.0, 0.0, 2.0]];
        let pooled = pool_tiles(&importance, &grid()).unwrap();
        assert_eq!(pooled, array![[4.0_f32, 2.0]]);
    }

    #[test]
    fn test_pool_rejects_wrong_shape() {
        let importance = Array2::<f32>::zeros((3, 4));
        assert!(matches!(
            pool_tiles(&importance, &grid()),
            Err(MediaError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_normalize() {
        let mut values = array![[2.0_f32, 4.0], [6.0, 10.0]];
        normalize(&mut values);
        assert_eq!(values, array![[0.0_f32, 0.25], [0.5, 1.0]]);

        let mut flat = array![[3.0_f32, 3.0]];
        normalize(&mut flat);
        assert_eq!(flat, array![[0.0_f32, 0.0]]);
    }

    #[test]
    fn test_threshold_and_top_percent() {
        let map = SaliencyMap::from_tiles(&array![[0.1_f32, 0.9], [0.5, 0.0]]);

        assert_eq!(map.threshold(0.4, 0.0).unwrap(), array![[0.0_f32, 1.0], [1.0, 0.0]]);
        assert_eq!(map.top_percent(25.0, 0.0).unwrap(), array![[0.0_f32, 1.0], [0.0, 0.0]]);
        assert_eq!(map.top_percent(0.0, 0.2).unwrap(), array![[0.2_f32, 0.2], [0.2, 0.2]]);
    }

    #[test]
    fn test_from_importance_serializes() {
        let importance = array![[1.0_f32, 1.0, 0.0, 0.0], [1.0, 1.0, 0.0, 2.0]];
        let map = SaliencyMap::from_importance(&importance, &grid()).unwrap();
        assert_eq!(map.values, vec![1.0, 0.0]);

        let json = serde_json::to_string(&map).unwrap();
        let back: SaliencyMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_truncated_values_rejected() {
        let map = SaliencyMap {
            rows: 2,
            cols: 2,
            values: vec![0.0; 3],
        };
        assert!(map.threshold(0.5, 0.0).is_err());
    }
}
