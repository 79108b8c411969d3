//! Media locator resolution.
//!
//! Turns a queue entry's `media_locator` into a local file the decoder can
//! read. Object-store media is downloaded into a per-job temporary directory
//! that is removed when the `ResolvedMedia` is dropped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use proofprint_models::QueueEntry;
use proofprint_storage::{ObjectStore, StorageError};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async_when, RetryPolicy};

/// Where a clip lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocator {
    /// Caller-owned file on this host
    Local(PathBuf),
    /// Key in the object store
    Stored(String),
}

impl MediaLocator {
    /// `file://…`, absolute paths and `./` / `../` paths are local; `store://key`
    /// and every other string is an object-store key.
    pub fn parse(locator: &str) -> Self {
        let locator = locator.trim();

        if let Some(path) = locator.strip_prefix("file://") {
            return Self::Local(PathBuf::from(path));
        }
        if let Some(key) = locator.strip_prefix("store://") {
            return Self::Stored(key.to_string());
        }

        let path = Path::new(locator);
        if path.is_absolute() || locator.starts_with("./") || locator.starts_with("../") {
            Self::Local(path.to_path_buf())
        } else {
            Self::Stored(locator.to_string())
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

/// A locally readable copy of a job's media.
#[derive(Debug)]
pub struct ResolvedMedia {
    path: PathBuf,
    locator: MediaLocator,
    // Held for its Drop; `None` for caller-owned local files.
    _workspace: Option<TempDir>,
}

impl ResolvedMedia {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn locator(&self) -> &MediaLocator {
        &self.locator
    }

    /// Whether the file is caller-owned rather than a download.
    pub fn is_local(&self) -> bool {
        self.locator.is_local()
    }
}

/// Resolves locators against the filesystem and the object store.
#[derive(Clone)]
pub struct MediaResolver {
    store: Arc<dyn ObjectStore>,
    work_dir: PathBuf,
    retry: RetryPolicy,
}

impl MediaResolver {
    pub fn new(store: Arc<dyn ObjectStore>, work_dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            store,
            work_dir: work_dir.into(),
            retry: retry.named("media_download"),
        }
    }

    /// Resolve an entry's media.
    ///
    /// Anything that does not yield a non-empty regular file is
    /// `MediaUnavailable`; a download that keeps failing is `DownloadFailed`.
    pub async fn resolve(&self, entry: &QueueEntry) -> WorkerResult<ResolvedMedia> {
        let locator = MediaLocator::parse(&entry.media_locator);

        match &locator {
            MediaLocator::Local(path) => {
                ensure_readable(path).await?;
                Ok(ResolvedMedia {
                    path: path.clone(),
                    locator,
                    _workspace: None,
                })
            }
            MediaLocator::Stored(key) => {
                let workspace = self.create_workspace(entry.id).await?;
                let dest = workspace.path().join(file_name_for(key));

                debug!("Downloading {} to {}", key, dest.display());
                retry_async_when(
                    &self.retry,
                    || self.store.fetch_to_file(key, &dest),
                    StorageError::is_transient,
                )
                .await
                .map_err(|e| match e {
                    StorageError::NotFound(_) | StorageError::InvalidKey(_) => {
                        WorkerError::media_unavailable(format!("{}: {}", key, e))
                    }
                    other => WorkerError::DownloadFailed(format!("{}: {}", key, other)),
                })?;

                ensure_readable(&dest).await?;
                Ok(ResolvedMedia {
                    path: dest,
                    locator,
                    _workspace: Some(workspace),
                })
            }
        }
    }

    async fn create_workspace(&self, entry_id: i64) -> WorkerResult<TempDir> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("job-{}-", entry_id))
            .tempdir_in(&self.work_dir)?;
        Ok(workspace)
    }
}

/// Open the file to prove it is readable. Absent or forbidden files are
/// `MediaUnavailable`; any other I/O error stays an I/O error.
async fn ensure_readable(path: &Path) -> WorkerResult<()> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| open_error(path, e))?;
    let meta = file.metadata().await?;

    if !meta.is_file() {
        return Err(WorkerError::media_unavailable(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if meta.len() == 0 {
        return Err(WorkerError::media_unavailable(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(())
}

fn open_error(path: &Path, e: std::io::Error) -> WorkerError {
    match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => {
            WorkerError::media_unavailable(format!("{}: {}", path.display(), e))
        }
        _ => WorkerError::Io(e),
    }
}

/// Last path segment of a key, keeping the extension for ffprobe.
fn file_name_for(key: &str) -> String {
    key.rsplit('/')
        .find(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("media")
        .to_string()
}
