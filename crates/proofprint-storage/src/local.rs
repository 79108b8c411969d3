//! Local directory object store.

use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Stores each key as a file under `root`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for `key`. Keys must be relative and stay under the root.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch_to_file(&self, key: &str, dest: &Path) -> StorageResult<()> {
        let src = self.path_for(key)?;
        debug!("Copying {} to {}", src.display(), dest.display());

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match tokio::fs::copy(&src, dest).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::download_failed(e.to_string())),
        }
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent).await?;

        let len = bytes.len();
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || write_once(&parent, &path, &bytes, &owned_key))
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))??;

        info!("Stored {} ({} bytes)", key, len);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(path).await?)
    }
}

/// Write `bytes` to a temp file in `dir`, fsync it, then link it to `path`
/// unless something is already there. The key only ever appears complete;
/// on any error the temp file is removed when it drops.
fn write_once(dir: &Path, path: &Path, bytes: &[u8], key: &str) -> StorageResult<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".upload-")
        .tempfile_in(dir)
        .map_err(|e| StorageError::upload_failed(e.to_string()))?;

    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| StorageError::upload_failed(e.to_string()))?;

    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Err(StorageError::already_exists(key)),
        Err(e) => Err(StorageError::upload_failed(e.error.to_string())),
    }
}
