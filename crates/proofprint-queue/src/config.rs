//! Queue database configuration.

use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// SQLite URL, e.g. `sqlite://proofprint.db`
    pub database_url: String,
    /// Pool size
    pub max_connections: u32,
    /// How long a statement waits on a locked database
    pub busy_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://proofprint.db".to_string(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://proofprint.db".to_string()),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            busy_timeout: Duration::from_millis(
                std::env::var("DATABASE_BUSY_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }
}
