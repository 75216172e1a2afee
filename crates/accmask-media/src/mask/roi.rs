//! ROI control stream codec.
//!
//! The stream carries one signed QP delta per tile, row-major, for every
//! frame. Two byte layouts are supported:
//!
//! - [`RoiLayout::Header`]: `i32` frame count, `i32` width in tiles, `i32`
//!   height in tiles, then `rows * cols` bytes per frame.
//! - [`RoiLayout::PerFrameHeader`]: `i32` width and `i32` height before every
//!   frame's bytes, no frame count.
//!
//! All integers are little-endian.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info};

use accmask_models::{QualityDeltas, RoiLayout};

use crate::error::{MediaError, MediaResult};
use crate::mask::binarize::BinaryMask;

const HEADER_INT: usize = 4;

/// Decoded per-tile deltas for a whole video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiStream {
    pub rows: usize,
    pub cols: usize,
    pub frames: Vec<Array2<i8>>,
}

impl RoiStream {
    /// Map deltas back to binary masks.
    ///
    /// A delta equal to `deltas.high` decodes to `1`, `deltas.low` to `0`; any
    /// other value is rejected, as are equal high and low deltas.
    pub fn to_binary(&self, deltas: &QualityDeltas) -> MediaResult<Vec<BinaryMask>> {
        ensure_distinct(deltas)?;
        self.frames
            .iter()
            .enumerate()
            .map(|(fid, frame)| {
                let mut mask = BinaryMask::zeros(frame.dim());
                for (out, &delta) in mask.iter_mut().zip(frame.iter()) {
                    *out = if delta == deltas.high {
                        1
                    } else if delta == deltas.low {
                        0
                    } else {
                        return Err(MediaError::malformed_mask(
                            format!("unexpected delta in frame {}", fid),
                            format!("{} or {}", deltas.high, deltas.low),
                            delta,
                        ));
                    };
                }
                Ok(mask)
            })
            .collect()
    }
}

/// Serializes binary masks into the ROI control stream.
#[derive(Debug, Clone, Copy)]
pub struct RoiEncoder {
    layout: RoiLayout,
    deltas: QualityDeltas,
}

impl RoiEncoder {
    pub fn new(layout: RoiLayout, deltas: QualityDeltas) -> Self {
        Self { layout, deltas }
    }

    pub fn layout(&self) -> RoiLayout {
        self.layout
    }

    pub fn deltas(&self) -> QualityDeltas {
        self.deltas
    }

    /// Encode masks; every mask must share the first mask's shape.
    pub fn encode(&self, masks: &[BinaryMask]) -> MediaResult<Vec<u8>> {
        ensure_distinct(&self.deltas)?;
        let (rows, cols) = masks.first().map(|m| m.dim()).unwrap_or((0, 0));
        let frame_len = rows * cols;

        let capacity = match self.layout {
            RoiLayout::Header => 3 * HEADER_INT + masks.len() * frame_len,
            RoiLayout::PerFrameHeader => masks.len() * (2 * HEADER_INT + frame_len),
        };
        let mut out = Vec::with_capacity(capacity);

        if self.layout == RoiLayout::Header {
            out.extend_from_slice(&header_int(masks.len(), "frame count")?);
            out.extend_from_slice(&header_int(cols, "width")?);
            out.extend_from_slice(&header_int(rows, "height")?);
        }

        for (fid, mask) in masks.iter().enumerate() {
            if mask.dim() != (rows, cols) {
                return Err(MediaError::malformed_mask(
                    format!("mask for frame {} has a different grid", fid),
                    format!("{}x{}", cols, rows),
                    format!("{}x{}", mask.ncols(), mask.nrows()),
                ));
            }
            if self.layout == RoiLayout::PerFrameHeader {
                out.extend_from_slice(&header_int(cols, "width")?);
                out.extend_from_slice(&header_int(rows, "height")?);
            }
            // logical iteration order is row-major
            out.extend(mask.iter().map(|&bit| self.deltas.for_tile(bit != 0) as u8));
        }

        Ok(out)
    }

    /// Decode a stream written with this encoder's layout.
    ///
    /// When `expected` is given as `(rows, cols)`, the header must agree.
    pub fn decode(&self, bytes: &[u8], expected: Option<(usize, usize)>) -> MediaResult<RoiStream> {
        match self.layout {
            RoiLayout::Header => decode_header(bytes, expected),
            RoiLayout::PerFrameHeader => decode_per_frame(bytes, expected),
        }
    }
}

fn ensure_distinct(deltas: &QualityDeltas) -> MediaResult<()> {
    if deltas.is_distinct() {
        Ok(())
    } else {
        Err(MediaError::malformed_mask(
            "high and low deltas are equal",
            "distinct deltas",
            deltas.high,
        ))
    }
}

/// Encode masks and write them to `path`.
///
/// Bytes go to a sibling temporary file that is renamed into place, so a
/// failed run never leaves a partial artifact at `path`.
pub fn write_roi_file(path: &Path, masks: &[BinaryMask], encoder: &RoiEncoder) -> MediaResult<()> {
    let bytes = encoder.encode(masks)?;
    let tmp = temp_path(path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&tmp, &bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    info!(
        path = %path.display(),
        frames = masks.len(),
        bytes = bytes.len(),
        layout = %encoder.layout(),
        "Wrote ROI file"
    );
    Ok(())
}

/// Read and validate an ROI file.
pub fn read_roi_file(
    path: &Path,
    encoder: &RoiEncoder,
    expected: Option<(usize, usize)>,
) -> MediaResult<RoiStream> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Read ROI file");
    encoder.decode(&bytes, expected)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn header_int(value: usize, field: &str) -> MediaResult<[u8; HEADER_INT]> {
    i32::try_from(value)
        .map(i32::to_le_bytes)
        .map_err(|_| MediaError::internal(format!("{} {} does not fit in i32", field, value)))
}

/// Little-endian cursor over the stream bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn dimension(&mut self, field: &str) -> MediaResult<usize> {
        let raw = self.bytes.get(self.pos..self.pos + HEADER_INT).ok_or_else(|| {
            MediaError::malformed_mask(
                format!("truncated header reading {}", field),
                format!("{} bytes", self.pos + HEADER_INT),
                format!("{} bytes", self.bytes.len()),
            )
        })?;
        self.pos += HEADER_INT;

        let mut buf = [0u8; HEADER_INT];
        buf.copy_from_slice(raw);
        let value = i32::from_le_bytes(buf);
        usize::try_from(value).map_err(|_| {
            MediaError::malformed_mask(format!("negative {}", field), "non-negative", value)
        })
    }

    fn frame(&mut self, rows: usize, cols: usize, fid: usize) -> MediaResult<Array2<i8>> {
        let len = rows * cols;
        let raw = self.bytes.get(self.pos..self.pos + len).ok_or_else(|| {
            MediaError::malformed_mask(
                format!("truncated record stream in frame {}", fid),
                format!("{} bytes", len),
                format!("{} bytes", self.remaining()),
            )
        })?;
        self.pos += len;

        let deltas: Vec<i8> = raw.iter().map(|&b| b as i8).collect();
        Array2::from_shape_vec((rows, cols), deltas).map_err(|e| MediaError::internal(e.to_string()))
    }
}

fn check_grid(expected: Option<(usize, usize)>, rows: usize, cols: usize) -> MediaResult<()> {
    match expected {
        Some((er, ec)) if (er, ec) != (rows, cols) => Err(MediaError::malformed_mask(
            "tile grid mismatch",
            format!("{}x{}", ec, er),
            format!("{}x{}", cols, rows),
        )),
        _ => Ok(()),
    }
}

fn decode_header(bytes: &[u8], expected: Option<(usize, usize)>) -> MediaResult<RoiStream> {
    let mut reader = Reader::new(bytes);
    let count = reader.dimension("frame count")?;
    let cols = reader.dimension("width")?;
    let rows = reader.dimension("height")?;
    check_grid(expected, rows, cols)?;

    let expected_len = count.saturating_mul(rows).saturating_mul(cols);
    if reader.remaining() != expected_len {
        return Err(MediaError::malformed_mask(
            format!("record stream length for {} frames of {}x{}", count, cols, rows),
            format!("{} bytes", expected_len),
            format!("{} bytes", reader.remaining()),
        ));
    }

    let frames = (0..count)
        .map(|fid| reader.frame(rows, cols, fid))
        .collect::<MediaResult<Vec<_>>>()?;
    Ok(RoiStream { rows, cols, frames })
}

fn decode_per_frame(bytes: &[u8], expected: Option<(usize, usize)>) -> MediaResult<RoiStream> {
    let mut reader = Reader::new(bytes);
    let mut grid = expected;
    let mut frames = Vec::new();

    while reader.remaining() > 0 {
        let cols = reader.dimension("width")?;
        let rows = reader.dimension("height")?;
        check_grid(grid, rows, cols)?;
        grid = Some((rows, cols));
        frames.push(reader.frame(rows, cols, frames.len())?);
    }

    let (rows, cols) = grid.unwrap_or((0, 0));
    Ok(RoiStream { rows, cols, frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn deltas() -> QualityDeltas {
        QualityDeltas::new(-10, 12)
    }

    fn masks() -> Vec<BinaryMask> {
        vec![array![[1_u8, 0, 0], [0, 1, 1]], array![[0_u8, 0, 0], [1, 1, 1]]]
    }

    #[test]
    fn test_header_layout_bytes() {
        let encoder = RoiEncoder::new(RoiLayout::Header, deltas());
        let bytes = encoder.encode(&masks()).unwrap();

        assert_eq!(&bytes[0..4], &2_i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &3_i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2_i32.to_le_bytes());
        assert_eq!(bytes.len(), 12 + 2 * 6);
        assert_eq!(bytes[12] as i8, -10);
        assert_eq!(bytes[13] as i8, 12);
    }

    #[test]
    fn test_round_trip_both_layouts() {
        for layout in [RoiLayout::Header, RoiLayout::PerFrameHeader] {
            let encoder = RoiEncoder::new(layout, deltas());
            let bytes = encoder.encode(&masks()).unwrap();
            let stream = encoder.decode(&bytes, Some((2, 3))).unwrap();

            assert_eq!(stream.frames.len(), 2);
            assert_eq!(stream.to_binary(&deltas()).unwrap(), masks());
            assert_eq!(encoder.encode(&stream.to_binary(&deltas()).unwrap()).unwrap(), bytes);
        }
    }

    #[test]
    fn test_per_frame_layout_repeats_header() {
        let encoder = RoiEncoder::new(RoiLayout::PerFrameHeader, deltas());
        let bytes = encoder.encode(&masks()).unwrap();

        assert_eq!(bytes.len(), 2 * (8 + 6));
        assert_eq!(&bytes[14..18], &3_i32.to_le_bytes());
    }

    #[test]
    fn test_truncated_stream_reports_sizes() {
        let encoder = RoiEncoder::new(RoiLayout::Header, deltas());
        let mut bytes = encoder.encode(&masks()).unwrap();
        bytes.pop();

        match encoder.decode(&bytes, None).unwrap_err() {
            MediaError::MalformedMask { expected, actual, .. } => {
                assert_eq!(expected, "12 bytes");
                assert_eq!(actual, "11 bytes");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_grid_mismatch_reports_dimensions() {
        let encoder = RoiEncoder::new(RoiLayout::Header, deltas());
        let bytes = encoder.encode(&masks()).unwrap();

        match encoder.decode(&bytes, Some((45, 80))).unwrap_err() {
            MediaError::MalformedMask { expected, actual, .. } => {
                assert_eq!(expected, "80x45");
                assert_eq!(actual, "3x2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_header_is_malformed() {
        let encoder = RoiEncoder::new(RoiLayout::Header, deltas());
        assert!(matches!(
            encoder.decode(&[1, 0, 0], None),
            Err(MediaError::MalformedMask { .. })
        ));
    }

    #[test]
    fn test_unknown_delta_rejected() {
        let stream = RoiStream {
            rows: 1,
            cols: 1,
            frames: vec![array![[3_i8]]],
        };
        assert!(stream.to_binary(&deltas()).is_err());
    }

    #[test]
    fn test_equal_deltas_rejected_both_ways() {
        let same = QualityDeltas::new(4, 4);
        let encoder = RoiEncoder::new(RoiLayout::Header, same);
        assert!(matches!(
            encoder.encode(&masks()),
            Err(MediaError::MalformedMask { .. })
        ));

        let stream = RoiStream {
            rows: 1,
            cols: 2,
            frames: vec![array![[4_i8, 4]]],
        };
        assert!(matches!(
            stream.to_binary(&same),
            Err(MediaError::MalformedMask { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_mixed_grids() {
        let encoder = RoiEncoder::new(RoiLayout::Header, deltas());
        let masks = vec![BinaryMask::zeros((2, 3)), BinaryMask::zeros((3, 2))];
        assert!(encoder.encode(&masks).is_err());
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("video.roi");
        let encoder = RoiEncoder::new(RoiLayout::Header, deltas());

        write_roi_file(&path, &masks(), &encoder).unwrap();
        assert!(!temp_path(&path).exists());

        let stream = read_roi_file(&path, &encoder, Some((2, 3))).unwrap();
        assert_eq!(stream.to_binary(&deltas()).unwrap(), masks());
    }

    #[test]
    fn test_read_missing_file() {
        let encoder = RoiEncoder::new(RoiLayout::Header, deltas());
        let err = read_roi_file(Path::new("/nonexistent/video.roi"), &encoder, None).unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
