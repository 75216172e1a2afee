//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid mask configuration: {0}")]
    MaskConfig(#[from] accmask_models::ConfigError),

    #[error("Encoding parameter error: {0}")]
    Encoding(#[from] accmask_models::QpParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] accmask_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] accmask_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Errors caused by the inputs rather than the environment.
    pub fn is_input_error(&self) -> bool {
        match self {
            WorkerError::ConfigError(_) | WorkerError::MaskConfig(_) | WorkerError::Encoding(_) => true,
            WorkerError::Media(e) => e.is_structural(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accmask_media::MediaError;

    #[test]
    fn test_input_errors() {
        assert!(WorkerError::config_error("missing ACCMASK_INPUTS").is_input_error());
        assert!(WorkerError::from(MediaError::shape_mismatch("2 vs 3 frames")).is_input_error());
        assert!(!WorkerError::processing_failed("blocking task panicked").is_input_error());
    }
}
