//! Detection results stored next to their video.
//!
//! Ground truth for `video.mp4` lives in `video.mp4.results.json`. When the
//! file is missing, the caller computes results from the highest quality
//! variant and they are written for later runs.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use accmask_models::DetectionResults;

use crate::error::{StorageError, StorageResult};

/// Suffix appended to a video path to locate its results.
pub const RESULTS_SUFFIX: &str = ".results.json";

/// Path of the results file belonging to `video`.
pub fn results_path(video: &Path) -> PathBuf {
    let mut path = video.as_os_str().to_os_string();
    path.push(RESULTS_SUFFIX);
    PathBuf::from(path)
}

/// JSON results files on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct ResultsStore {
    /// Explicit results file overriding the path derived from the video
    override_path: Option<PathBuf>,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always use `path` instead of the derived location.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            override_path: Some(path.into()),
        }
    }

    pub fn path_for(&self, video: &Path) -> PathBuf {
        self.override_path
            .clone()
            .unwrap_or_else(|| results_path(video))
    }

    /// Read results; a missing file is `Ok(None)`, a malformed one an error.
    pub async fn load(&self, video: &Path) -> StorageResult<Option<DetectionResults>> {
        let path = self.path_for(video);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stored detection results");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let results: DetectionResults = serde_json::from_slice(&data)?;
        debug!(
            path = %path.display(),
            application = %results.application,
            frames = results.len(),
            "Loaded detection results"
        );
        Ok(Some(results))
    }

    /// Write results, replacing the file atomically.
    pub async fn store(&self, video: &Path, results: &DetectionResults) -> StorageResult<PathBuf> {
        let path = self.path_for(video);
        let json = serde_json::to_vec_pretty(results)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", path.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            frames = results.len(),
            detections = results.total_detections(),
            "Stored detection results"
        );
        Ok(path)
    }

    /// Load stored results or compute and store them.
    pub async fn load_or_compute<F, Fut, E>(&self, video: &Path, compute: F) -> Result<DetectionResults, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DetectionResults, E>>,
        E: From<StorageError>,
    {
        if let Some(results) = self.load(video).await? {
            return Ok(results);
        }

        info!(video = %video.display(), "Computing ground truth detections");
        let results = compute().await?;
        self.store(video, &results).await?;
        Ok(results)
    }
}
