//! Forensic queue entries and the status state machine.
//!
//! An entry moves `pending → processing → {done | failed | missing_file}`.
//! The three right-hand states are terminal: nothing in the worker moves an
//! entry out of them, and a resubmission is a new pending entry.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ProofId;

/// Queue entry processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for a worker to claim it
    #[default]
    Pending,
    /// Claimed by exactly one worker
    Processing,
    /// Fingerprints persisted
    Done,
    /// Decode error or unexpected pipeline failure
    Failed,
    /// Media locator did not resolve to readable bytes
    MissingFile,
}

impl QueueStatus {
    /// All statuses, in state-machine order.
    pub const ALL: [QueueStatus; 5] = [
        QueueStatus::Pending,
        QueueStatus::Processing,
        QueueStatus::Done,
        QueueStatus::Failed,
        QueueStatus::MissingFile,
    ];

    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Failed => "failed",
            QueueStatus::MissingFile => "missing_file",
        }
    }

    /// Check if this is a terminal state (no further automatic transition).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueStatus::Done | QueueStatus::Failed | QueueStatus::MissingFile
        )
    }

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (QueueStatus::Pending, QueueStatus::Processing)
                | (QueueStatus::Processing, QueueStatus::Done)
                | (QueueStatus::Processing, QueueStatus::Failed)
                | (QueueStatus::Processing, QueueStatus::MissingFile)
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown queue status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for QueueStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StatusParseError(s.to_string()))
    }
}

/// A unit of forensic work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueueEntry {
    /// Row identity
    pub id: i64,
    /// Proof this entry fingerprints
    pub proof_id: ProofId,
    /// Owner of the proof
    pub user_id: String,
    /// Local path or object-store key of the source clip
    pub media_locator: String,
    /// Current status
    pub status: QueueStatus,
    /// Token written by the claim that moved the entry to `processing`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_token: Option<String>,
    /// Worker that holds (or last held) the claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    /// Failure detail for `failed` / `missing_file` entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// When the entry was claimed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Check if the entry is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
