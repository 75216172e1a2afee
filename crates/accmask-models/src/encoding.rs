//! Quality-delta settings for the per-tile ROI control stream.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoder baseline QP the deltas are relative to.
pub const DEFAULT_BASE_QP: i32 = 22;

/// Failure to derive a quality parameter or delta.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QpParseError {
    #[error("Video name has no trailing _{{qp}} token: {0}")]
    MissingToken(String),

    #[error("Invalid QP token '{token}' in {name}")]
    InvalidToken { name: String, token: String },

    #[error("QP delta {0} does not fit in a signed byte")]
    DeltaOutOfRange(i32),

    #[error("Unknown ROI layout: {0}")]
    UnknownLayout(String),

    #[error("High and low quality deltas are both {0}; tiles could not be told apart")]
    EqualDeltas(i8),
}

/// Extract the quality parameter from a variant file name.
///
/// Variant names follow `{stem}_{qp}.{ext}`, e.g. `dashcam_1_qp_34.mp4` → 34.
pub fn qp_from_name(path: impl AsRef<Path>) -> Result<i32, QpParseError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| QpParseError::MissingToken(name.clone()))?;

    let (_, token) = stem
        .rsplit_once('_')
        .ok_or_else(|| QpParseError::MissingToken(name.clone()))?;

    token.parse::<i32>().map_err(|_| QpParseError::InvalidToken {
        name,
        token: token.to_string(),
    })
}

/// Signed per-tile QP deltas written into the ROI control stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QualityDeltas {
    /// Delta for tiles the mask keeps at high quality
    pub high: i8,
    /// Delta for all remaining tiles
    pub low: i8,
}

impl QualityDeltas {
    /// Create deltas directly.
    pub fn new(high: i8, low: i8) -> Self {
        Self { high, low }
    }

    /// Derive deltas from the high/low variant QPs relative to a base QP.
    ///
    /// Equal deltas are rejected: a stream written with them decodes every
    /// tile the same way.
    pub fn from_qps(high_qp: i32, low_qp: i32, base_qp: i32) -> Result<Self, QpParseError> {
        let high = to_delta(high_qp - base_qp)?;
        let low = to_delta(low_qp - base_qp)?;
        if high == low {
            return Err(QpParseError::EqualDeltas(high));
        }
        Ok(Self { high, low })
    }

    /// True when high and low tiles get different deltas.
    #[inline]
    pub fn is_distinct(&self) -> bool {
        self.high != self.low
    }

    /// Delta for a binarized tile value.
    #[inline]
    pub fn for_tile(&self, high_quality: bool) -> i8 {
        if high_quality {
            self.high
        } else {
            self.low
        }
    }
}

fn to_delta(delta: i32) -> Result<i8, QpParseError> {
    i8::try_from(delta).map_err(|_| QpParseError::DeltaOutOfRange(delta))
}

/// Byte layout of the ROI control stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoiLayout {
    /// Frame count, width and height once, then all frames.
    #[default]
    Header,
    /// Width and height repeated before every frame (kvazaar `--roi-file`).
    PerFrameHeader,
}

impl RoiLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoiLayout::Header => "header",
            RoiLayout::PerFrameHeader => "per_frame_header",
        }
    }
}

impl fmt::Display for RoiLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoiLayout {
    type Err = QpParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "header" => Ok(RoiLayout::Header),
            "per_frame_header" | "kvazaar" => Ok(RoiLayout::PerFrameHeader),
            _ => Err(QpParseError::UnknownLayout(s.to_string())),
        }
    }
}
