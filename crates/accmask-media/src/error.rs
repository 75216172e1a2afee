//! Error types for media and mask operations.

use std::path::PathBuf;
use thiserror::Error;

use accmask_models::{ConfigError, QpParseError};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during mask optimization and media handling.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Quality variants disagree: {0}")]
    ShapeMismatch(String),

    #[error("Invalid tile size: {0}")]
    InvalidTileSize(String),

    #[error("Malformed ROI file: {message} (expected {expected}, got {actual})")]
    MalformedMask {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid quality parameter: {0}")]
    Qp(#[from] QpParseError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid video: {0}")]
    InvalidVideo(String),

    #[error("Object detection failed: {0}")]
    DetectionFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch(message.into())
    }

    /// Create a malformed ROI file error with expected vs actual context.
    pub fn malformed_mask(
        message: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::MalformedMask {
            message: message.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for errors that describe the run's inputs or configuration rather
    /// than a transient per-frame condition.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            MediaError::ShapeMismatch(_)
                | MediaError::InvalidTileSize(_)
                | MediaError::MalformedMask { .. }
                | MediaError::Config(_)
                | MediaError::Qp(_)
        )
    }
}
