//! Filesystem storage for received imaging payloads
//!
//! Payloads land under a configured storage root, keyed by the file
//! name the listener derives from the extracted instance identifier.
//! Writes from concurrent connections target distinct names, so no
//! locking is needed beyond what the filesystem provides.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Filesystem-backed raw payload storage
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root_path: PathBuf,
}

impl FilesystemStorage {
    /// Create the storage backend, creating the root directory when it
    /// does not exist yet
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self, StorageError> {
        let root_path = root_path.as_ref().to_path_buf();
        if !root_path.exists() {
            std::fs::create_dir_all(&root_path).map_err(|e| {
                StorageError::Config(format!(
                    "Failed to create storage root '{}': {}",
                    root_path.display(),
                    e
                ))
            })?;
        }
        Ok(Self { root_path })
    }

    /// Root directory payloads are written under
    pub fn base_path(&self) -> &Path {
        &self.root_path
    }

    /// Write bytes under the storage root, returning the full path
    pub async fn write(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, StorageError> {
        let full_path = self.root_path.join(file_name);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, contents).await?;
        debug!(path = %full_path.display(), bytes = contents.len(), "payload written");
        Ok(full_path)
    }
}

#[async_trait]
impl dimse::PayloadStore for FilesystemStorage {
    async fn store(&self, file_name: &str, payload: &[u8]) -> dimse::Result<PathBuf> {
        self.write(file_name, payload)
            .await
            .map_err(|e| dimse::DimseError::Storage(e.to_string()))
    }
}
