//! Queue error types.

use proofprint_models::{ProofId, QueueStatus};
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Proof {0} already has a pending or processing entry")]
    DuplicateActiveEntry(ProofId),

    #[error("Result for proof {0} already exists")]
    DuplicateResult(ProofId),

    #[error("Lease lost for queue entry {0}")]
    LeaseLost(i64),

    #[error("Cannot finish an entry as {0}: not a terminal status")]
    NonTerminalStatus(QueueStatus),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Errors that mean the queue's own invariants were broken, as opposed
    /// to I/O trouble that a later attempt could get past.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateResult(_) | Self::LeaseLost(_) | Self::CorruptRow(_)
        )
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
