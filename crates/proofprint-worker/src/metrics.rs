//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use proofprint_models::QueueStatus;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "proofprint_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "proofprint_job_duration_seconds";
    pub const INVARIANT_VIOLATIONS_TOTAL: &str = "proofprint_invariant_violations_total";
    pub const LOOP_ERRORS_TOTAL: &str = "proofprint_loop_errors_total";
}

/// Serve `/metrics` on `addr`.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install metrics exporter: {}", e)))
}

/// Record a job reaching a terminal status.
pub fn record_job(status: QueueStatus, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "status" => status.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration_secs);
}

pub fn record_invariant_violation() {
    counter!(names::INVARIANT_VIOLATIONS_TOTAL).increment(1);
}

pub fn record_loop_error() {
    counter!(names::LOOP_ERRORS_TOTAL).increment(1);
}
