//! Tile grid model.
//!
//! A frame is partitioned into square tiles of `tile_size` pixels; the tile is
//! the unit of quality selection, so the mask has shape `(H / ts, W / ts)`.

use std::ops::Range;

use accmask_models::BoundingBox;

use crate::error::{MediaError, MediaResult};

/// Tile partition of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_size: u32,
    cols: usize,
    rows: usize,
}

impl TileGrid {
    /// Create a grid for `width x height` frames.
    ///
    /// The tile size must divide both dimensions; trailing partial tiles are
    /// rejected rather than silently dropped.
    pub fn new(width: u32, height: u32, tile_size: u32) -> MediaResult<Self> {
        if tile_size == 0 {
            return Err(MediaError::InvalidTileSize("tile size must be positive".into()));
        }
        if width % tile_size != 0 || height % tile_size != 0 {
            return Err(MediaError::InvalidTileSize(format!(
                "{} does not divide frame dimensions {}x{}",
                tile_size, width, height
            )));
        }

        Ok(Self {
            width,
            height,
            tile_size,
            cols: (width / tile_size) as usize,
            rows: (height / tile_size) as usize,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of tile columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of tile rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Mask shape `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of tiles.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel rectangle covered by a tile.
    pub fn tile_rect(&self, row: usize, col: usize) -> BoundingBox {
        let ts = self.tile_size as f64;
        BoundingBox::new(col as f64 * ts, row as f64 * ts, ts, ts)
    }

    /// Tile containing a pixel, or `None` outside the frame.
    pub fn tile_of_pixel(&self, x: u32, y: u32) -> Option<(usize, usize)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(((y / self.tile_size) as usize, (x / self.tile_size) as usize))
    }

    /// Tiles covered by a pixel rectangle.
    ///
    /// The span holds every tile the rectangle overlaps, so partly covered
    /// edge tiles are included. Zero-area and out-of-frame rectangles map to
    /// an empty span.
    pub fn tiles_for_rect(&self, rect: &BoundingBox) -> TileSpan {
        if rect.is_degenerate() {
            return TileSpan::empty();
        }

        let cols = axis_span(rect.x, rect.x2(), self.width, self.tile_size, self.cols);
        let rows = axis_span(rect.y, rect.y2(), self.height, self.tile_size, self.rows);

        match (rows, cols) {
            (Some(rows), Some(cols)) => TileSpan { rows, cols },
            _ => TileSpan::empty(),
        }
    }
}

fn axis_span(lo: f64, hi: f64, extent: u32, tile_size: u32, count: usize) -> Option<Range<usize>> {
    let lo = lo.max(0.0);
    let hi = hi.min(extent as f64);
    if hi <= lo {
        return None;
    }

    let ts = tile_size as f64;
    let start = (lo / ts).floor() as usize;
    let end = ((hi / ts).ceil() as usize).min(count);
    (start < end).then_some(start..end)
}

/// Rectangular set of tiles, half-open in both axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSpan {
    rows: Range<usize>,
    cols: Range<usize>,
}

impl TileSpan {
    /// A span covering no tiles.
    pub fn empty() -> Self {
        Self { rows: 0..0, cols: 0..0 }
    }

    /// Row range (half-open).
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// Column range (half-open).
    pub fn cols(&self) -> Range<usize> {
        self.cols.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    /// Number of tiles in the span.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.rows.len() * self.cols.len()
        }
    }

    /// Whether a tile belongs to the span.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.rows.contains(&row) && self.cols.contains(&col)
    }

    /// Iterate `(row, col)` pairs in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = if self.is_empty() { 0..0 } else { self.cols.clone() };
        self.rows
            .clone()
            .flat_map(move |row| cols.clone().map(move |col| (row, col)))
    }
}
