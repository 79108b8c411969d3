//! Structured job logging and subscriber setup.

use proofprint_queue::ClaimedEntry;
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "proofprint=info,sqlx=warn";

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, ANSI text otherwise.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Job logger carrying `queue_id`, `proof_id` and `operation` on every event.
#[derive(Debug, Clone)]
pub struct JobLogger {
    queue_id: i64,
    proof_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(claim: &ClaimedEntry, operation: &str) -> Self {
        Self {
            queue_id: claim.id(),
            proof_id: claim.proof_id().to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            queue_id = self.queue_id,
            proof_id = %self.proof_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            queue_id = self.queue_id,
            proof_id = %self.proof_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            queue_id = self.queue_id,
            proof_id = %self.proof_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            queue_id = self.queue_id,
            proof_id = %self.proof_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            queue_id = self.queue_id,
            proof_id = %self.proof_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            queue_id = self.queue_id,
            proof_id = %self.proof_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proofprint_models::{ProofId, QueueEntry, QueueStatus};

    #[test]
    fn test_job_logger_fields() {
        let now = Utc::now();
        let claim = ClaimedEntry {
            entry: QueueEntry {
                id: 17,
                proof_id: ProofId::from("proof-9"),
                user_id: "u".to_string(),
                media_locator: "clip.mp4".to_string(),
                status: QueueStatus::Processing,
                lease_token: Some("lease".to_string()),
                claimed_by: Some("w".to_string()),
                last_error: None,
                created_at: now,
                updated_at: now,
                claimed_at: Some(now),
            },
            lease_token: "lease".to_string(),
        };

        let logger = JobLogger::new(&claim, "fingerprint");
        assert_eq!(logger.queue_id, 17);
        assert_eq!(logger.proof_id, "proof-9");
        assert_eq!(logger.operation, "fingerprint");
    }
}
