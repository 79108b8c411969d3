//! SHA-256 digests over numeric series.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Zero-mean, unit-variance copy of `series` (population std; a constant
/// series divides by 1.0).
pub fn z_normalize(series: &[f64]) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }
    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    let var = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    let std = if std > 0.0 { std } else { 1.0 };
    series.iter().map(|x| (x - mean) / std).collect()
}

/// Digest of a z-normalized series serialized as little-endian f32.
pub fn series_digest(series: &[f64]) -> String {
    let bytes: Vec<u8> = z_normalize(series)
        .into_iter()
        .flat_map(|x| (x as f32).to_le_bytes())
        .collect();
    sha256_hex(&bytes)
}
