//! Forensic fingerprint results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ProofId;

/// The three analyzer digests for one clip.
///
/// Each field is a 64-character lowercase SHA-256 hex digest, or `None`
/// when that analyzer found nothing to fingerprint (no audio, silence,
/// clip too short, no decodable frames).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Fingerprints {
    pub enf_hash: Option<String>,
    pub audio_fingerprint: Option<String>,
    pub video_phash: Option<String>,
}

impl Fingerprints {
    /// Number of analyzers that produced a digest.
    pub fn present_count(&self) -> usize {
        [&self.enf_hash, &self.audio_fingerprint, &self.video_phash]
            .iter()
            .filter(|d| d.is_some())
            .count()
    }
}

/// Persisted result row, at most one per proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ForensicResult {
    pub proof_id: ProofId,
    pub enf_hash: Option<String>,
    pub audio_fingerprint: Option<String>,
    pub video_phash: Option<String>,
    /// Reserved; always `None` from the worker.
    pub metadata_hash: Option<String>,
    /// Reserved chain-of-custody extension point; always `None` from the worker.
    pub chain_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ForensicResult {
    /// Assemble a result from analyzer output.
    pub fn new(proof_id: ProofId, fingerprints: Fingerprints) -> Self {
        Self {
            proof_id,
            enf_hash: fingerprints.enf_hash,
            audio_fingerprint: fingerprints.audio_fingerprint,
            video_phash: fingerprints.video_phash,
            metadata_hash: None,
            chain_hash: None,
            created_at: Utc::now(),
        }
    }

    /// The analyzer digests of this result.
    pub fn fingerprints(&self) -> Fingerprints {
        Fingerprints {
            enf_hash: self.enf_hash.clone(),
            audio_fingerprint: self.audio_fingerprint.clone(),
            video_phash: self.video_phash.clone(),
        }
    }
}
