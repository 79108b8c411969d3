//! Proof records created by the ingest collaborator.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a submitted proof.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProofId(pub String);

impl ProofId {
    /// Generate a new random proof ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProofId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProofId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProofId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A submitted clip, immutable after ingest.
///
/// The worker only ever reads `id` and `user_id` (through the queue entry);
/// the remaining fields are caller-supplied evidence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProofRecord {
    /// Proof identity
    pub id: ProofId,
    /// Owner of the proof
    pub user_id: String,
    /// Display name supplied at upload
    pub name: String,
    /// Caller-supplied digest of the original clip (e.g. SHA-256 hex)
    pub content_hash: String,
    /// Opaque caller-supplied signature
    pub signature: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ProofRecord {
    /// Create a new proof record with a fresh ID.
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        content_hash: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            id: ProofId::new(),
            user_id: user_id.into(),
            name: name.into(),
            content_hash: content_hash.into(),
            signature: signature.into(),
            created_at: Utc::now(),
        }
    }
}
