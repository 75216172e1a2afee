//! Cache storage backends.
//!
//! Keys are `/`-separated relative paths such as
//! `dashcam_1/saliency/tile_16.json.gz`.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Byte store behind the caches.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Store bytes under a key, replacing any existing object.
    async fn upload_bytes(&self, key: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Fetch the bytes of a key; a missing key is [`StorageError::NotFound`].
    async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a key. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Reject empty, absolute and parent-escaping keys.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::invalid_key("empty key"));
    }
    let path = Path::new(key);
    let safe = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// Cache objects stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl CacheBackend for LocalFsBackend {
    async fn upload_bytes(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", key, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", key, e)))?;

        debug!(key, bytes = data.len(), "Stored cache object");
        Ok(())
    }

    async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn name(&self) -> &'static str {
        "local_fs"
    }
}

/// In-process cache objects, for tests and runs without a cache directory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn upload_bytes(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("video/saliency/tile_16.json.gz").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("video/../../escape").is_err());
    }

    #[tokio::test]
    async fn test_local_fs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalFsBackend::new(dir.path());

        assert!(!backend.exists("a/b.bin").await.unwrap());
        backend.upload_bytes("a/b.bin", vec![1, 2, 3]).await.unwrap();
        assert!(backend.exists("a/b.bin").await.unwrap());
        assert_eq!(backend.download_bytes("a/b.bin").await.unwrap(), vec![1, 2, 3]);

        backend.delete_object("a/b.bin").await.unwrap();
        backend.delete_object("a/b.bin").await.unwrap();
        assert!(backend
            .download_bytes("a/b.bin")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty().await);

        backend.upload_bytes("k", b"v".to_vec()).await.unwrap();
        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.download_bytes("k").await.unwrap(), b"v".to_vec());
        assert!(backend.download_bytes("missing").await.unwrap_err().is_not_found());
    }
}
