//! Persistent artifacts for accmask runs.
//!
//! This crate provides:
//! - Cache backends (local filesystem, in-memory)
//! - Saliency cache (gzip-compressed JSON, versioned)
//! - Detection results files stored next to their video

pub mod backend;
pub mod error;
pub mod results;
pub mod saliency_cache;

pub use backend::{CacheBackend, LocalFsBackend, MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use results::{results_path, ResultsStore};
pub use saliency_cache::{
    compress_entry, decompress_entry, saliency_cache_key, SaliencyCache, SaliencyCacheEntry,
    SaliencyFrames, SALIENCY_CACHE_VERSION,
};
