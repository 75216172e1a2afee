//! Saliency cache.
//!
//! Per-frame saliency maps of a video are stored as one gzip-compressed JSON
//! entry per video and tile size. Missing, corrupt and outdated entries are
//! all cache misses.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::{Read, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use accmask_media::mask::SaliencyMap;

use crate::backend::CacheBackend;
use crate::error::{StorageError, StorageResult};

/// Current cache entry format. Entries with another version are ignored.
pub const SALIENCY_CACHE_VERSION: u32 = 1;

/// Saliency maps keyed by frame id.
pub type SaliencyFrames = BTreeMap<u32, SaliencyMap>;

/// Serialized cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaliencyCacheEntry {
    pub version: u32,
    pub video: String,
    pub tile_size: u32,
    pub created_at: DateTime<Utc>,
    pub frames: SaliencyFrames,
}

impl SaliencyCacheEntry {
    pub fn new(video: impl Into<String>, tile_size: u32, frames: SaliencyFrames) -> Self {
        Self {
            version: SALIENCY_CACHE_VERSION,
            video: video.into(),
            tile_size,
            created_at: Utc::now(),
            frames,
        }
    }

    pub fn is_current_version(&self) -> bool {
        self.version == SALIENCY_CACHE_VERSION
    }
}

/// Generate the cache key for a video's saliency maps.
///
/// Format: `{video}/saliency/tile_{tile_size}.json.gz`
pub fn saliency_cache_key(video: &str, tile_size: u32) -> String {
    format!("{}/saliency/tile_{}.json.gz", video, tile_size)
}

/// Compress an entry to gzip JSON bytes.
pub fn compress_entry(entry: &SaliencyCacheEntry) -> StorageResult<Vec<u8>> {
    let json = serde_json::to_string(entry).map_err(|e| {
        StorageError::Serialization(format!("Failed to serialize saliency entry: {}", e))
    })?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes()).map_err(|e| {
        StorageError::Serialization(format!("Failed to gzip saliency entry: {}", e))
    })?;

    encoder.finish().map_err(|e| {
        StorageError::Serialization(format!("Failed to finish gzip encoding: {}", e))
    })
}

/// Decompress gzip JSON bytes to an entry.
///
/// Returns `None` on corrupt data or an outdated version.
pub fn decompress_entry(data: &[u8]) -> Option<SaliencyCacheEntry> {
    let mut decoder = GzDecoder::new(data);
    let mut json = String::new();

    if let Err(e) = decoder.read_to_string(&mut json) {
        warn!(error = %e, "Failed to decompress saliency cache entry");
        return None;
    }

    match serde_json::from_str::<SaliencyCacheEntry>(&json) {
        Ok(entry) if entry.is_current_version() => Some(entry),
        Ok(entry) => {
            debug!(
                cached_version = entry.version,
                current_version = SALIENCY_CACHE_VERSION,
                "Saliency cache version mismatch, treating as miss"
            );
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to deserialize saliency cache entry");
            None
        }
    }
}

/// Saliency cache over an injected backend.
#[derive(Clone)]
pub struct SaliencyCache {
    backend: Arc<dyn CacheBackend>,
}

impl SaliencyCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Load cached maps; any failure is a miss.
    pub async fn load(&self, video: &str, tile_size: u32) -> Option<SaliencyFrames> {
        let key = saliency_cache_key(video, tile_size);

        let data = match self.backend.download_bytes(&key).await {
            Ok(data) => data,
            Err(e) => {
                debug!(key = %key, error = %e, "Saliency cache miss (download failed)");
                return None;
            }
        };

        match decompress_entry(&data) {
            Some(entry) if entry.tile_size == tile_size => {
                debug!(key = %key, frames = entry.frames.len(), "Saliency cache hit");
                Some(entry.frames)
            }
            Some(entry) => {
                warn!(
                    key = %key,
                    cached_tile_size = entry.tile_size,
                    tile_size,
                    "Saliency cache entry has wrong tile size, treating as miss"
                );
                None
            }
            None => {
                debug!(key = %key, "Saliency cache miss (corrupt or outdated)");
                None
            }
        }
    }

    /// Store maps, returning the compressed size in bytes.
    pub async fn store(
        &self,
        video: &str,
        tile_size: u32,
        frames: &SaliencyFrames,
    ) -> StorageResult<u64> {
        let key = saliency_cache_key(video, tile_size);
        let entry = SaliencyCacheEntry::new(video, tile_size, frames.clone());
        let compressed = compress_entry(&entry)?;
        let size = compressed.len() as u64;

        debug!(
            key = %key,
            frames = frames.len(),
            compressed_size = size,
            backend = self.backend.name(),
            "Storing saliency maps"
        );
        self.backend.upload_bytes(&key, compressed).await?;
        Ok(size)
    }

    /// Load cached maps or compute and store them.
    ///
    /// A failed store is logged; the computed maps are still returned.
    pub async fn load_or_compute<F, Fut, E>(
        &self,
        video: &str,
        tile_size: u32,
        compute: F,
    ) -> Result<SaliencyFrames, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SaliencyFrames, E>>,
    {
        if let Some(frames) = self.load(video, tile_size).await {
            return Ok(frames);
        }

        info!(video, tile_size, "Computing saliency maps");
        let frames = compute().await?;
        if let Err(e) = self.store(video, tile_size, &frames).await {
            warn!(video, error = %e, "Failed to cache saliency maps");
        }
        Ok(frames)
    }

    /// Drop a video's cached maps.
    pub async fn invalidate(&self, video: &str, tile_size: u32) -> StorageResult<()> {
        self.backend
            .delete_object(&saliency_cache_key(video, tile_size))
            .await
    }
}
