//! Table definitions, created idempotently at startup.

/// Schema for proofs, the forensic queue and forensic results.
///
/// At most one `pending`/`processing` entry per proof, and at most one
/// result row per proof.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS proofs (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL,
    name         TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    signature    TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS forensic_queue (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    proof_id      TEXT NOT NULL REFERENCES proofs(id),
    user_id       TEXT NOT NULL,
    media_locator TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending'
                  CHECK (status IN ('pending', 'processing', 'done', 'failed', 'missing_file')),
    lease_token   TEXT,
    claimed_by    TEXT,
    last_error    TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    claimed_at    TEXT
);

CREATE INDEX IF NOT EXISTS idx_forensic_queue_status
    ON forensic_queue (status, created_at, id);

CREATE UNIQUE INDEX IF NOT EXISTS idx_forensic_queue_active_proof
    ON forensic_queue (proof_id)
    WHERE status IN ('pending', 'processing');

CREATE TABLE IF NOT EXISTS forensic_results (
    proof_id          TEXT PRIMARY KEY REFERENCES proofs(id),
    enf_hash          TEXT,
    audio_fingerprint TEXT,
    video_phash       TEXT,
    metadata_hash     TEXT,
    chain_hash        TEXT,
    created_at        TEXT NOT NULL
);
"#;

/// Tables the worker needs; checked by the selfcheck binary.
pub const TABLES: [&str; 3] = ["proofs", "forensic_queue", "forensic_results"];
