//! Shared data models for the proofprint backend.
//!
//! This crate provides Serde-serializable types for:
//! - Proof records created at ingest
//! - Forensic queue entries and their status state machine
//! - Forensic fingerprint results
//! - Diagnostic artifacts (ENF spectrograms)

pub mod artifact;
pub mod proof;
pub mod queue_entry;
pub mod result;

// Re-export common types
pub use artifact::{artifact_key, DiagnosticArtifact, PNG_CONTENT_TYPE};
pub use proof::{ProofId, ProofRecord};
pub use queue_entry::{QueueEntry, QueueStatus, StatusParseError};
pub use result::{Fingerprints, ForensicResult};
