//! Centered short-time Fourier transform.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::cancel::CancelFlag;

/// Hann-windowed STFT with centered, zero-padded frames.
///
/// Frame `t` is centered on sample `t * hop`, so a signal of `len` samples
/// yields `1 + len / hop` frames.
#[derive(Clone)]
pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for Stft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stft")
            .field("n_fft", &self.n_fft)
            .field("hop", &self.hop)
            .finish()
    }
}

impl Stft {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        Self {
            n_fft,
            hop: hop.max(1),
            window: hann_window(n_fft),
            fft,
        }
    }

    /// Number of frequency bins per frame (`n_fft / 2 + 1`).
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frequency of `bin` in Hz.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f64 {
        bin as f64 * sample_rate as f64 / self.n_fft as f64
    }

    pub fn frame_count(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            1 + len / self.hop
        }
    }

    /// Magnitude spectrum `|X|` of every frame, `[frame][bin]`.
    pub fn magnitudes(&self, samples: &[f32]) -> Vec<Vec<f64>> {
        self.magnitudes_until(samples, &CancelFlag::new())
            .unwrap_or_default()
    }

    /// Like `magnitudes`, but returns `None` as soon as `cancel` is set.
    pub fn magnitudes_until(&self, samples: &[f32], cancel: &CancelFlag) -> Option<Vec<Vec<f64>>> {
        let half = self.n_fft / 2;
        let mut buffer = vec![Complex::new(0.0, 0.0); self.n_fft];
        let count = self.frame_count(samples.len());
        let mut frames = Vec::with_capacity(count);

        for t in 0..count {
            if cancel.is_cancelled() {
                return None;
            }
            let center = t * self.hop;
            for (k, slot) in buffer.iter_mut().enumerate() {
                // position in the unpadded signal
                let pos = (center + k).checked_sub(half);
                let x = pos
                    .and_then(|p| samples.get(p))
                    .map_or(0.0, |&s| s as f64);
                *slot = Complex::new(x * self.window[k], 0.0);
            }
            self.fft.process(&mut buffer);
            frames.push(buffer[..self.n_bins()].iter().map(|c| c.norm()).collect());
        }

        Some(frames)
    }

    /// Power spectrum `|X|^2` of every frame, `[frame][bin]`.
    pub fn power(&self, samples: &[f32]) -> Vec<Vec<f64>> {
        self.power_until(samples, &CancelFlag::new()).unwrap_or_default()
    }

    pub fn power_until(&self, samples: &[f32], cancel: &CancelFlag) -> Option<Vec<Vec<f64>>> {
        let mut frames = self.magnitudes_until(samples, cancel)?;
        for frame in &mut frames {
            for v in frame.iter_mut() {
                *v *= *v;
            }
        }
        Some(frames)
    }
}

/// Periodic Hann window.
fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count() {
        let stft = Stft::new(2048, 500);
        assert_eq!(stft.frame_count(0), 0);
        assert_eq!(stft.frame_count(499), 1);
        assert_eq!(stft.frame_count(5000), 11);
    }

    #[test]
    fn test_cancelled_stft_stops() {
        let stft = Stft::new(64, 16);
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(stft.magnitudes_until(&[0.5; 256], &cancel).is_none());
        assert_eq!(stft.magnitudes_until(&[0.5; 256], &CancelFlag::new()).unwrap().len(), 17);
    }

    #[test]
    fn test_hann_window_shape() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-12);
        assert!((w[2] - w[6]).abs() < 1e-12);
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let sr = 1000u32;
        let stft = Stft::new(2048, 500);
        let samples: Vec<f32> = (0..10_000)
            .map(|i| (2.0 * PI * 60.0 * i as f64 / sr as f64).sin() as f32)
            .collect();

        let frames = stft.magnitudes(&samples);
        assert_eq!(frames.len(), 21);

        let middle = &frames[10];
        let peak = middle
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0;
        assert!((stft.bin_frequency(peak, sr) - 60.0).abs() < 0.5);
    }
}
