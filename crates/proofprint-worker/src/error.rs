//! Worker error types.

use std::time::Duration;

use proofprint_models::QueueStatus;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("Media download failed: {0}")]
    DownloadFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] proofprint_media::MediaError),

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error("Queue error: {0}")]
    Queue(#[from] proofprint_queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] proofprint_storage::StorageError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl WorkerError {
    pub fn media_unavailable(msg: impl Into<String>) -> Self {
        Self::MediaUnavailable(msg.into())
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Terminal status a job hitting this error moves to.
    ///
    /// `None` means the error is transient: the entry stays `processing`
    /// and the loop carries on.
    pub fn terminal_status(&self) -> Option<QueueStatus> {
        match self {
            WorkerError::MediaUnavailable(_) => Some(QueueStatus::MissingFile),
            WorkerError::DownloadFailed(_)
            | WorkerError::Media(_)
            | WorkerError::Timeout(_)
            | WorkerError::InvariantViolation(_)
            | WorkerError::Io(_) => Some(QueueStatus::Failed),
            WorkerError::Queue(e) if e.is_invariant_violation() => Some(QueueStatus::Failed),
            WorkerError::Queue(_) | WorkerError::Storage(_) | WorkerError::ConfigError(_) => None,
        }
    }

    /// Whether this error means a queue or result invariant was broken.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            WorkerError::InvariantViolation(_) => true,
            WorkerError::Queue(e) => e.is_invariant_violation(),
            _ => false,
        }
    }
}
