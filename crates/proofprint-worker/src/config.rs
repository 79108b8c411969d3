//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::retry::RetryPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity recorded with each claim
    pub worker_id: String,
    /// Sleep between loop iterations
    pub poll_interval: Duration,
    /// Parent of per-job temporary directories
    pub work_dir: PathBuf,
    /// Bound on one pipeline invocation
    pub job_timeout: Duration,
    /// Bound on each ffmpeg/ffprobe subprocess
    pub decode_timeout: Duration,
    /// Age after which a `processing` entry is considered abandoned
    pub lease_timeout: Duration,
    /// How often abandoned entries are reaped
    pub reap_interval: Duration,
    /// Retry policy for queue and storage I/O
    pub retry: RetryPolicy,
    /// Delete caller-owned local media after a `done` commit
    pub consume_local_source: bool,
    /// Prometheus exporter listen address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_millis(5000),
            work_dir: PathBuf::from("/tmp/proofprint"),
            job_timeout: Duration::from_secs(600),
            decode_timeout: Duration::from_secs(180),
            lease_timeout: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            consume_local_source: false,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            worker_id: std::env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            poll_interval: Duration::from_millis(env_or("WORKER_POLL_INTERVAL_MS", 5000)),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            job_timeout: Duration::from_secs(env_or("WORKER_JOB_TIMEOUT_SECS", 600)),
            decode_timeout: Duration::from_secs(env_or("WORKER_DECODE_TIMEOUT_SECS", 180)),
            lease_timeout: Duration::from_secs(env_or("WORKER_LEASE_TIMEOUT_SECS", 3600)),
            reap_interval: Duration::from_secs(env_or("WORKER_REAP_INTERVAL_SECS", 300)),
            retry: RetryPolicy::new("worker_io")
                .with_max_retries(env_or("WORKER_RETRY_MAX_ATTEMPTS", 3))
                .with_base_delay(Duration::from_millis(env_or("WORKER_RETRY_BASE_DELAY_MS", 200)))
                .with_max_delay(Duration::from_millis(env_or("WORKER_RETRY_MAX_DELAY_MS", 5000))),
            consume_local_source: env_or("WORKER_CONSUME_LOCAL_SOURCE", false),
            metrics_addr: std::env::var("WORKER_METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert!(config.worker_id.starts_with("worker-"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.lease_timeout, Duration::from_secs(3600));
        assert!(!config.consume_local_source);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("PROOFPRINT_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or("PROOFPRINT_TEST_ENV_OR", 7u64), 7);
        std::env::set_var("PROOFPRINT_TEST_ENV_OR", " 42 ");
        assert_eq!(env_or("PROOFPRINT_TEST_ENV_OR", 7u64), 42);
        std::env::remove_var("PROOFPRINT_TEST_ENV_OR");
    }
}
