//! Forensic queue backed by SQLite.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use proofprint_models::{ForensicResult, ProofId, ProofRecord, QueueEntry, QueueStatus};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row, Sqlite};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{is_unique_violation, QueueError, QueueResult};
use crate::schema::{SCHEMA, TABLES};

const ENTRY_COLUMNS: &str = "id, proof_id, user_id, media_locator, status, lease_token, \
                             claimed_by, last_error, created_at, updated_at, claimed_at";

/// Error text recorded on entries whose lease ran out.
pub const LEASE_EXPIRED: &str = "lease expired";

/// An entry this worker moved to `processing`, with the lease that proves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedEntry {
    pub entry: QueueEntry,
    pub lease_token: String,
}

impl ClaimedEntry {
    pub fn id(&self) -> i64 {
        self.entry.id
    }

    pub fn proof_id(&self) -> &ProofId {
        &self.entry.proof_id
    }
}

/// Queue client.
#[derive(Debug, Clone)]
pub struct ForensicQueue {
    pool: SqlitePool,
}

impl ForensicQueue {
    /// Open (creating if missing) the database at `config.database_url`.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| QueueError::connection_failed(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        info!("Connected to queue database {}", config.database_url);
        Ok(Self { pool })
    }

    /// Create from environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(&QueueConfig::from_env()).await
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    pub async fn init(&self) -> QueueResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        debug!("Queue schema ready");
        Ok(())
    }

    /// Names of required tables that are missing.
    pub async fn missing_tables(&self) -> QueueResult<Vec<&'static str>> {
        let mut missing = Vec::new();
        for table in TABLES {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            )
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
            if !exists {
                missing.push(table);
            }
        }
        Ok(missing)
    }

    /// Record a proof and a pending entry for it.
    pub async fn enqueue(&self, proof: &ProofRecord, media_locator: &str) -> QueueResult<QueueEntry> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO proofs (id, user_id, name, content_hash, signature, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(proof.id.as_str())
        .bind(&proof.user_id)
        .bind(&proof.name)
        .bind(&proof.content_hash)
        .bind(&proof.signature)
        .bind(proof.created_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO forensic_queue (proof_id, user_id, media_locator, status, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(proof.id.as_str())
        .bind(&proof.user_id)
        .bind(media_locator)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                QueueError::DuplicateActiveEntry(proof.id.clone())
            } else {
                QueueError::Database(e)
            }
        })?;

        let entry = entry_from_row(&row)?;
        tx.commit().await?;

        info!("Enqueued proof {} as entry {}", proof.id, entry.id);
        Ok(entry)
    }

    /// Atomically move the oldest pending entry to `processing`.
    ///
    /// Select and update happen in one statement, and the update re-checks
    /// `status = 'pending'`, so concurrent callers never claim the same row.
    pub async fn claim_one_pending(&self, worker_id: &str) -> QueueResult<Option<ClaimedEntry>> {
        let lease_token = Uuid::new_v4().to_string();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r#"
            UPDATE forensic_queue
            SET status = 'processing', lease_token = ?1, claimed_by = ?2,
                claimed_at = ?3, updated_at = ?3, last_error = NULL
            WHERE id = (
                SELECT id FROM forensic_queue
                WHERE status = 'pending'
                ORDER BY created_at, id
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(&lease_token)
        .bind(worker_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let entry = entry_from_row(&row)?;
                debug!("Worker {} claimed entry {}", worker_id, entry.id);
                Ok(Some(ClaimedEntry { entry, lease_token }))
            }
            None => Ok(None),
        }
    }

    /// Move a claimed entry to a terminal status.
    ///
    /// Fails with `LeaseLost` if the entry is no longer `processing` under
    /// this claim's lease.
    pub async fn finish(
        &self,
        claim: &ClaimedEntry,
        status: QueueStatus,
        error: Option<&str>,
    ) -> QueueResult<()> {
        if !status.is_terminal() {
            return Err(QueueError::NonTerminalStatus(status));
        }

        let updated = finish_query(claim, status, error)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            warn!("Entry {} was not processing under our lease", claim.id());
            return Err(QueueError::LeaseLost(claim.id()));
        }

        debug!("Entry {} -> {}", claim.id(), status);
        Ok(())
    }

    /// Insert the result and mark the entry `done` in one transaction.
    ///
    /// Nothing is committed if a result for the proof already exists
    /// (`DuplicateResult`) or the lease was lost (`LeaseLost`).
    pub async fn complete(&self, claim: &ClaimedEntry, result: &ForensicResult) -> QueueResult<()> {
        let mut tx = self.pool.begin().await?;

        insert_result_query(result)
            .execute(&mut *tx)
            .await
            .map_err(|e| duplicate_result_or(e, &result.proof_id))?;

        let updated = finish_query(claim, QueueStatus::Done, None)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(QueueError::LeaseLost(claim.id()));
        }

        tx.commit().await?;
        info!("Entry {} done, result stored for proof {}", claim.id(), result.proof_id);
        Ok(())
    }

    /// Insert a result row. Results are never updated.
    pub async fn insert_result(&self, result: &ForensicResult) -> QueueResult<()> {
        insert_result_query(result)
            .execute(&self.pool)
            .await
            .map_err(|e| duplicate_result_or(e, &result.proof_id))?;
        Ok(())
    }

    /// Fail every `processing` entry claimed longer than `older_than` ago.
    pub async fn reap_expired_leases(&self, older_than: chrono::Duration) -> QueueResult<u64> {
        let now = Utc::now();
        let cutoff = now - older_than;

        let reaped = sqlx::query(
            r#"
            UPDATE forensic_queue
            SET status = 'failed', last_error = ?, updated_at = ?
            WHERE status = 'processing' AND claimed_at < ?
            "#,
        )
        .bind(LEASE_EXPIRED)
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if reaped > 0 {
            warn!("Reaped {} entries with expired leases", reaped);
        }
        Ok(reaped)
    }

    pub async fn entry(&self, id: i64) -> QueueResult<Option<QueueEntry>> {
        let row = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM forensic_queue WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    pub async fn result(&self, proof_id: &ProofId) -> QueueResult<Option<ForensicResult>> {
        let row = sqlx::query(
            r#"
            SELECT proof_id, enf_hash, audio_fingerprint, video_phash,
                   metadata_hash, chain_hash, created_at
            FROM forensic_results WHERE proof_id = ?
            "#,
        )
        .bind(proof_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> QueueResult<ForensicResult> {
            Ok(ForensicResult {
                proof_id: ProofId::from_string(row.try_get::<String, _>("proof_id")?),
                enf_hash: row.try_get("enf_hash")?,
                audio_fingerprint: row.try_get("audio_fingerprint")?,
                video_phash: row.try_get("video_phash")?,
                metadata_hash: row.try_get("metadata_hash")?,
                chain_hash: row.try_get("chain_hash")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn count_by_status(&self, status: QueueStatus) -> QueueResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM forensic_queue WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

type SqliteQuery<'a> = sqlx::query::Query<'a, Sqlite, SqliteArguments<'a>>;

fn finish_query<'a>(
    claim: &'a ClaimedEntry,
    status: QueueStatus,
    error: Option<&'a str>,
) -> SqliteQuery<'a> {
    sqlx::query(
        r#"
        UPDATE forensic_queue
        SET status = ?, last_error = ?, updated_at = ?
        WHERE id = ? AND status = 'processing' AND lease_token = ?
        "#,
    )
    .bind(status.as_str())
    .bind(error)
    .bind(Utc::now())
    .bind(claim.id())
    .bind(claim.lease_token.as_str())
}

fn insert_result_query(result: &ForensicResult) -> SqliteQuery<'_> {
    sqlx::query(
        r#"
        INSERT INTO forensic_results
            (proof_id, enf_hash, audio_fingerprint, video_phash, metadata_hash, chain_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(result.proof_id.as_str())
    .bind(result.enf_hash.as_deref())
    .bind(result.audio_fingerprint.as_deref())
    .bind(result.video_phash.as_deref())
    .bind(result.metadata_hash.as_deref())
    .bind(result.chain_hash.as_deref())
    .bind(result.created_at)
}

fn duplicate_result_or(err: sqlx::Error, proof_id: &ProofId) -> QueueError {
    if is_unique_violation(&err) {
        QueueError::DuplicateResult(proof_id.clone())
    } else {
        QueueError::Database(err)
    }
}

fn entry_from_row(row: &SqliteRow) -> QueueResult<QueueEntry> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<QueueStatus>()
        .map_err(|e| QueueError::CorruptRow(e.to_string()))?;

    Ok(QueueEntry {
        id: row.try_get("id")?,
        proof_id: ProofId::from_string(row.try_get::<String, _>("proof_id")?),
        user_id: row.try_get("user_id")?,
        media_locator: row.try_get("media_locator")?,
        status,
        lease_token: row.try_get("lease_token")?,
        claimed_by: row.try_get("claimed_by")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        claimed_at: row.try_get::<Option<DateTime<Utc>>, _>("claimed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proofprint_models::Fingerprints;
    use tempfile::TempDir;

    async fn test_queue() -> (TempDir, ForensicQueue) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("queue.db").display());
        let queue = ForensicQueue::connect(&QueueConfig::default().with_url(url))
            .await
            .unwrap();
        queue.init().await.unwrap();
        (dir, queue)
    }

    fn proof(user: &str) -> ProofRecord {
        ProofRecord::new(user, "clip.mp4", "deadbeef", "sig")
    }

    fn result_for(proof_id: &ProofId) -> ForensicResult {
        ForensicResult::new(
            proof_id.clone(),
            Fingerprints {
                enf_hash: None,
                audio_fingerprint: Some("a".repeat(64)),
                video_phash: Some("b".repeat(64)),
            },
        )
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (_dir, queue) = test_queue().await;
        queue.init().await.unwrap();
        assert!(queue.missing_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_moves_entry_to_processing() {
        let (_dir, queue) = test_queue().await;
        let p = proof("u1");
        let entry = queue.enqueue(&p, "/media/clip.mp4").await.unwrap();
        assert_eq!(entry.status, QueueStatus::Pending);

        let claim = queue.claim_one_pending("worker-a").await.unwrap().unwrap();
        assert_eq!(claim.id(), entry.id);
        assert_eq!(claim.entry.status, QueueStatus::Processing);
        assert_eq!(claim.entry.lease_token.as_deref(), Some(claim.lease_token.as_str()));
        assert_eq!(claim.entry.claimed_by.as_deref(), Some("worker-a"));
        assert!(claim.entry.claimed_at.is_some());

        assert!(queue.claim_one_pending("worker-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claims_oldest_first() {
        let (_dir, queue) = test_queue().await;
        let first = queue.enqueue(&proof("u1"), "a.mp4").await.unwrap();
        let second = queue.enqueue(&proof("u1"), "b.mp4").await.unwrap();

        assert_eq!(queue.claim_one_pending("w").await.unwrap().unwrap().id(), first.id);
        assert_eq!(queue.claim_one_pending("w").await.unwrap().unwrap().id(), second.id);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let (_dir, queue) = test_queue().await;
        queue.enqueue(&proof("u1"), "a.mp4").await.unwrap();

        let (a, b) = tokio::join!(
            queue.claim_one_pending("worker-a"),
            queue.claim_one_pending("worker-b")
        );
        let claimed = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
        assert_eq!(claimed, 1);
        assert_eq!(queue.count_by_status(QueueStatus::Processing).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_active_entry_rejected() {
        let (_dir, queue) = test_queue().await;
        let p = proof("u1");
        queue.enqueue(&p, "a.mp4").await.unwrap();

        let err = queue.enqueue(&p, "a.mp4").await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateActiveEntry(_)));

        // once terminal, the proof may be resubmitted
        let claim = queue.claim_one_pending("w").await.unwrap().unwrap();
        queue.finish(&claim, QueueStatus::Failed, Some("decode error")).await.unwrap();
        queue.enqueue(&p, "a.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_finish_requires_lease() {
        let (_dir, queue) = test_queue().await;
        queue.enqueue(&proof("u1"), "a.mp4").await.unwrap();
        let claim = queue.claim_one_pending("w").await.unwrap().unwrap();

        let forged = ClaimedEntry {
            entry: claim.entry.clone(),
            lease_token: "not-the-lease".to_string(),
        };
        let err = queue.finish(&forged, QueueStatus::Failed, None).await.unwrap_err();
        assert!(matches!(err, QueueError::LeaseLost(_)));

        let err = queue.finish(&claim, QueueStatus::Pending, None).await.unwrap_err();
        assert!(matches!(err, QueueError::NonTerminalStatus(QueueStatus::Pending)));

        queue
            .finish(&claim, QueueStatus::MissingFile, Some("not found"))
            .await
            .unwrap();
        let entry = queue.entry(claim.id()).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::MissingFile);
        assert_eq!(entry.last_error.as_deref(), Some("not found"));

        // terminal states are final
        let err = queue.finish(&claim, QueueStatus::Done, None).await.unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[tokio::test]
    async fn test_complete_stores_result_and_marks_done() {
        let (_dir, queue) = test_queue().await;
        let p = proof("u1");
        queue.enqueue(&p, "a.mp4").await.unwrap();
        let claim = queue.claim_one_pending("w").await.unwrap().unwrap();

        let result = result_for(&p.id);
        queue.complete(&claim, &result).await.unwrap();

        let entry = queue.entry(claim.id()).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Done);

        let stored = queue.result(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.fingerprints(), result.fingerprints());
        assert_eq!(stored.metadata_hash, None);
        assert_eq!(stored.chain_hash, None);
    }

    #[tokio::test]
    async fn test_duplicate_result_commits_nothing() {
        let (_dir, queue) = test_queue().await;
        let p = proof("u1");

        queue.enqueue(&p, "a.mp4").await.unwrap();
        let first = queue.claim_one_pending("w").await.unwrap().unwrap();
        queue.complete(&first, &result_for(&p.id)).await.unwrap();

        queue.enqueue(&p, "a.mp4").await.unwrap();
        let second = queue.claim_one_pending("w").await.unwrap().unwrap();

        let mut other = result_for(&p.id);
        other.enf_hash = Some("c".repeat(64));
        let err = queue.complete(&second, &other).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateResult(_)));
        assert!(err.is_invariant_violation());

        let entry = queue.entry(second.id()).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Processing);
        assert_eq!(queue.result(&p.id).await.unwrap().unwrap().enf_hash, None);

        let err = queue.insert_result(&other).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateResult(_)));
    }

    #[tokio::test]
    async fn test_reap_expired_leases() {
        let (_dir, queue) = test_queue().await;
        queue.enqueue(&proof("u1"), "a.mp4").await.unwrap();
        let claim = queue.claim_one_pending("w").await.unwrap().unwrap();

        assert_eq!(
            queue.reap_expired_leases(chrono::Duration::hours(1)).await.unwrap(),
            0
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(
            queue.reap_expired_leases(chrono::Duration::zero()).await.unwrap(),
            1
        );

        let entry = queue.entry(claim.id()).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Failed);
        assert_eq!(entry.last_error.as_deref(), Some(LEASE_EXPIRED));

        // the original holder can no longer finish it
        let err = queue.finish(&claim, QueueStatus::Done, None).await.unwrap_err();
        assert!(matches!(err, QueueError::LeaseLost(_)));
    }
}
