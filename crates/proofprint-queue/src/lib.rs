//! SQLite-backed forensic job queue.
//!
//! This crate provides:
//! - Schema creation for proofs, queue entries and results
//! - Atomic single-row claims with lease tokens
//! - Lease-checked terminal transitions
//! - Transactional result commits (insert-only, one per proof)
//! - Reaping of entries whose lease expired

pub mod config;
pub mod error;
pub mod queue;
pub mod schema;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use queue::{ClaimedEntry, ForensicQueue};
