//! Forensic fingerprint queue worker.
//!
//! This crate provides:
//! - Environment-driven worker configuration
//! - Media locator resolution into per-job temporary files
//! - Single-job processing with terminal-state bookkeeping
//! - The sequential claim/process/sleep executor loop with lease reaping
//! - Retry, structured job logging and Prometheus metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod media_source;
pub mod metrics;
pub mod processor;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{IterationOutcome, JobExecutor};
pub use logging::{init_tracing, JobLogger};
pub use media_source::{MediaLocator, MediaResolver, ResolvedMedia};
pub use processor::{JobOutcome, JobProcessor};
pub use retry::{retry_async, retry_async_when, FailureTracker, RetryPolicy};
