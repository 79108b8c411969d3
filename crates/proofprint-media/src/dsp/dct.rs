//! Two-dimensional DCT-II, low-frequency corner only.

use std::f64::consts::PI;

/// Unnormalized 2-D DCT-II of an `n x n` row-major matrix, keeping the
/// top-left `block x block` coefficients (row-major).
///
/// Each axis uses `y[k] = 2 * sum x[i] * cos(pi * k * (2i + 1) / 2n)`.
pub fn dct2_low_block(input: &[f64], n: usize, block: usize) -> Vec<f64> {
    debug_assert_eq!(input.len(), n * n);
    let block = block.min(n);

    // cos_table[k][i]
    let cos_table: Vec<Vec<f64>> = (0..block)
        .map(|k| {
            (0..n)
                .map(|i| 2.0 * (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos())
                .collect()
        })
        .collect();

    // transform along rows: rows[r][v]
    let rows: Vec<Vec<f64>> = input
        .chunks_exact(n)
        .map(|row| {
            cos_table
                .iter()
                .map(|basis| basis.iter().zip(row).map(|(c, x)| c * x).sum())
                .collect()
        })
        .collect();

    let mut out = Vec::with_capacity(block * block);
    for basis in &cos_table {
        for v in 0..block {
            out.push(basis.iter().zip(&rows).map(|(c, row)| c * row[v]).sum());
        }
    }
    out
}

/// Median, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
