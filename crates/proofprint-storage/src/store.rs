//! The object store seam and backend selection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};
use crate::local::LocalObjectStore;

/// Key-addressed blob storage.
///
/// `put_bytes` is write-once: an existing key is never overwritten and
/// reports `StorageError::AlreadyExists`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `key` into `dest`, creating parent directories.
    async fn fetch_to_file(&self, key: &str, dest: &Path) -> StorageResult<()>;

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// Which `ObjectStore` implementation to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local { root: PathBuf },
    R2,
}

impl StorageBackend {
    /// Read `STORAGE_BACKEND` (`local` | `r2`, default `local`) and
    /// `STORAGE_LOCAL_ROOT` (default `/data/proofprint`).
    pub fn from_env() -> StorageResult<Self> {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string());
        match backend.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local {
                root: std::env::var("STORAGE_LOCAL_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/data/proofprint")),
            }),
            "r2" | "s3" => Ok(Self::R2),
            other => Err(StorageError::config_error(format!(
                "Unknown STORAGE_BACKEND '{}', expected 'local' or 'r2'",
                other
            ))),
        }
    }
}

/// Build the store selected by the environment.
pub async fn open_from_env() -> StorageResult<Arc<dyn ObjectStore>> {
    match StorageBackend::from_env()? {
        StorageBackend::Local { root } => {
            info!("Using local object store at {}", root.display());
            Ok(Arc::new(LocalObjectStore::new(root)))
        }
        StorageBackend::R2 => {
            let client = R2Client::from_env().await?;
            info!("Using R2 object store, bucket {}", client.bucket());
            Ok(Arc::new(client))
        }
    }
}
