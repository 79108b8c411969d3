//! ENF diagnostic spectrogram rendering.

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};

use crate::error::{MediaError, MediaResult};

/// Floor added to magnitudes before taking the log.
const MAGNITUDE_FLOOR: f64 = 1e-6;

/// Vertical pixels per frequency bin in the rendered image.
const ROW_SCALE: u32 = 4;

/// Colormap anchors, dark to bright.
const PALETTE: [[u8; 3]; 5] = [
    [68, 1, 84],
    [59, 82, 139],
    [33, 145, 140],
    [94, 201, 98],
    [253, 231, 37],
];

/// Low-frequency magnitude spectrogram in dB, `[frame][bin]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnfSpectrogram {
    pub db: Vec<Vec<f64>>,
    /// Width of one frequency bin (Hz)
    pub bin_hz: f64,
}

impl EnfSpectrogram {
    /// Keep bins at or below `max_freq` and convert to `20 * log10(|X| + 1e-6)`.
    pub fn from_magnitudes(frames: &[Vec<f64>], bin_hz: f64, max_freq: f64) -> Self {
        let n_bins = if bin_hz > 0.0 {
            (max_freq / bin_hz).floor() as usize + 1
        } else {
            0
        };

        let db = frames
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .take(n_bins)
                    .map(|m| 20.0 * (m + MAGNITUDE_FLOOR).log10())
                    .collect()
            })
            .collect();

        Self { db, bin_hz }
    }

    pub fn frames(&self) -> usize {
        self.db.len()
    }

    pub fn bins(&self) -> usize {
        self.db.first().map_or(0, Vec::len)
    }

    /// Render as PNG: time left to right, low frequencies at the bottom.
    pub fn render_png(&self) -> MediaResult<Vec<u8>> {
        let (frames, bins) = (self.frames(), self.bins());
        if frames == 0 || bins == 0 {
            return Err(MediaError::internal("Empty spectrogram"));
        }

        let (lo, hi) = self
            .db
            .iter()
            .flatten()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = if hi > lo { hi - lo } else { 1.0 };

        let width = frames as u32;
        let height = bins as u32 * ROW_SCALE;

        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
            let bin = (height - 1 - y) / ROW_SCALE;
            let value = self.db[x as usize][bin as usize];
            Rgb(colormap((value - lo) / range))
        });

        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
        Ok(bytes)
    }
}

/// Interpolate the palette at `t` in `0..=1`.
fn colormap(t: f64) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0) * (PALETTE.len() - 1) as f64;
    let i = (t.floor() as usize).min(PALETTE.len() - 2);
    let frac = t - i as f64;
    let (a, b) = (PALETTE[i], PALETTE[i + 1]);
    let lerp = |c: usize| (a[c] as f64 + (b[c] as f64 - a[c] as f64) * frac).round() as u8;
    [lerp(0), lerp(1), lerp(2)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_bins_up_to_max_freq() {
        let frames = vec![vec![1.0; 1025]; 3];
        let spec = EnfSpectrogram::from_magnitudes(&frames, 1000.0 / 2048.0, 80.0);
        assert_eq!(spec.frames(), 3);
        assert_eq!(spec.bins(), 164);
        assert!(spec.db[0][0].abs() < 1e-4);
    }

    #[test]
    fn test_render_png_signature() {
        let frames: Vec<Vec<f64>> = (0..10)
            .map(|t| (0..200).map(|b| ((t * b) % 7) as f64).collect())
            .collect();
        let spec = EnfSpectrogram::from_magnitudes(&frames, 0.5, 80.0);
        let png = spec.render_png().unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 10);
        assert_eq!(decoded.height(), 161 * ROW_SCALE);
    }

    #[test]
    fn test_empty_spectrogram_is_error() {
        let spec = EnfSpectrogram::from_magnitudes(&[], 0.5, 80.0);
        assert!(spec.render_png().is_err());
    }

    #[test]
    fn test_colormap_endpoints() {
        assert_eq!(colormap(0.0), PALETTE[0]);
        assert_eq!(colormap(1.0), PALETTE[4]);
        assert_eq!(colormap(2.0), PALETTE[4]);
    }
}
