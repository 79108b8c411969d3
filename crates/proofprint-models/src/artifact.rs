//! Diagnostic artifacts written alongside results.

use crate::ProofId;

/// Content type of rendered spectrograms.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Object-store key of the ENF spectrogram for a proof.
pub fn artifact_key(user_id: &str, proof_id: &ProofId) -> String {
    format!("{}/{}_enf.png", user_id, proof_id)
}

/// A rendered, write-once diagnostic image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticArtifact {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

impl DiagnosticArtifact {
    /// Wrap a rendered ENF spectrogram PNG.
    pub fn enf_spectrogram(user_id: &str, proof_id: &ProofId, png: Vec<u8>) -> Self {
        Self {
            key: artifact_key(user_id, proof_id),
            bytes: png,
            content_type: PNG_CONTENT_TYPE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_convention() {
        let proof = ProofId::from("0f9c");
        assert_eq!(artifact_key("user-7", &proof), "user-7/0f9c_enf.png");

        let artifact = DiagnosticArtifact::enf_spectrogram("user-7", &proof, vec![1, 2, 3]);
        assert_eq!(artifact.key, "user-7/0f9c_enf.png");
        assert_eq!(artifact.content_type, "image/png");
    }
}
