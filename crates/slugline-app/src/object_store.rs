//! Source-document byte storage.
//!
//! The pipeline only ever fetches a submitted script back by its key; the
//! upload surface (presigned URLs etc.) lives outside this process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("invalid object key `{key}`")]
    InvalidKey { key: String },
    #[error("object store I/O failure for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// Filesystem-backed store; keys map to paths under a root directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(ObjectStoreError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(Path::new(key)))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key)?;
        let io_err = |source| ObjectStoreError::Io {
            key: key.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(io_err)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(source) => Err(ObjectStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// In-memory store for tests and the `memory` backend.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        let mut objects = self.objects.lock().await;
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let objects = self.objects.lock().await;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fs_store_round_trips_bytes() {
        let temp = TempDir::new().expect("temp dir");
        let store = FsObjectStore::new(temp.path());
        store
            .put("scripts/job-1.txt", b"INT. LAB - DAY")
            .await
            .expect("put");
        let bytes = store.get("scripts/job-1.txt").await.expect("get");
        assert_eq!(bytes, b"INT. LAB - DAY");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let temp = TempDir::new().expect("temp dir");
        let store = FsObjectStore::new(temp.path());
        let err = store.get("scripts/absent").await.expect_err("must fail");
        assert!(matches!(err, ObjectStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let store = FsObjectStore::new(temp.path());
        let err = store.get("../etc/passwd").await.expect_err("must fail");
        assert!(matches!(err, ObjectStoreError::InvalidKey { .. }));
    }
}
