//! Blob store adapters
//!
//! [`InMemoryBlobStore`] for tests and single-process runs, [`FsBlobStore`] for
//! keeping uploads on local disk under a root directory.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{PortError, PortResult};
use crate::ports::BlobStore;

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

/// Blob store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, StoredBlob>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.get(key).and_then(|b| b.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> PortResult<()> {
        self.blobs.insert(
            key.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).map(|b| b.bytes.clone()))
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// Blob store writing one file per key below `root`
///
/// Keys are slash-separated relative paths. Absolute keys and keys containing
/// `..` are rejected with [`PortError::InvalidKey`].
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> PortResult<PathBuf> {
        if key.trim().is_empty() {
            return Err(PortError::InvalidKey("empty blob key".to_string()));
        }

        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(PortError::InvalidKey(key.to_string()));
                }
            }
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> PortResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(key, bytes = bytes.len(), content_type, "Writing blob");
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(key, error = %e, "Failed to remove blob");
                Err(e.into())
            }
        }
    }
}
