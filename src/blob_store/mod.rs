//! Object store seam for raw audio and audit logs.
//!
//! The object store itself is an external collaborator; only its contract is
//! in scope. Keys are `/`-separated string paths within a single bucket.
//! The filesystem implementation maps the bucket to a root directory, which
//! is enough for single-host deployments and for tests.

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("blob store I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Addressable blob storage keyed by string paths.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// `content_type` is advisory; implementations may ignore it.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobStoreError>;

    fn bucket_exists(&self) -> Result<bool, BlobStoreError>;

    /// Create the bucket when missing.
    fn ensure_bucket(&self) -> Result<(), BlobStoreError>;
}

/// Filesystem-backed blob store: the bucket is a root directory, object
/// keys are relative paths beneath it.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        FsBlobStore { root: root.into() }
    }

    /// Resolve a key to a path under the root, rejecting traversal.
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        let relative = Path::new(key);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || traversal {
            return Err(BlobStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.resolve(key)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobStoreError::NotFound(key.to_string())
            } else {
                BlobStoreError::Io {
                    key: key.to_string(),
                    source: e,
                }
            }
        })
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobStoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BlobStoreError::Io {
                key: key.to_string(),
                source: e,
            })?;
        }
        fs::write(&path, bytes).map_err(|e| BlobStoreError::Io {
            key: key.to_string(),
            source: e,
        })?;
        debug!("Stored {} bytes at {} ({})", bytes.len(), key, content_type);
        Ok(())
    }

    fn bucket_exists(&self) -> Result<bool, BlobStoreError> {
        Ok(self.root.is_dir())
    }

    fn ensure_bucket(&self) -> Result<(), BlobStoreError> {
        fs::create_dir_all(&self.root).map_err(|e| BlobStoreError::Io {
            key: String::new(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store
            .put("audio/abc.wav", b"RIFF....", "application/octet-stream")
            .unwrap();
        assert_eq!(store.get("audio/abc.wav").unwrap(), b"RIFF....");
    }

    #[test]
    fn test_get_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.get("audio/missing.wav"),
            Err(BlobStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_bucket_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("bucket"));
        assert!(!store.bucket_exists().unwrap());
        store.ensure_bucket().unwrap();
        assert!(store.bucket_exists().unwrap());
    }

    #[test]
    fn test_traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in ["../escape", "/absolute", ""] {
            assert!(matches!(
                store.put(key, b"x", "text/plain"),
                Err(BlobStoreError::InvalidKey(_))
            ));
        }
    }
}
