//! Multi-frame perceptual video hash.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer};
use tracing::debug;

use crate::cancel::CancelFlag;
use crate::config::VideoHashParams;
use crate::decode::GrayFrame;
use crate::dsp::{dct2_low_block, median, sha256_hex};
use crate::error::{MediaError, MediaResult};

/// Hashes each sampled frame with a DCT pHash, then digests the ordered
/// per-frame hashes into `video_phash`.
#[derive(Debug, Clone, Default)]
pub struct VideoPerceptualHasher {
    params: VideoHashParams,
}

impl VideoPerceptualHasher {
    pub fn new(params: VideoHashParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &VideoHashParams {
        &self.params
    }

    /// Combined digest of `frames` in order; `None` when there are no frames.
    pub fn hash(&self, frames: &[GrayFrame]) -> MediaResult<Option<String>> {
        self.hash_until(frames, &CancelFlag::new())
    }

    /// `hash` that stops with `None` once `cancel` is set.
    pub fn hash_until(
        &self,
        frames: &[GrayFrame],
        cancel: &CancelFlag,
    ) -> MediaResult<Option<String>> {
        if frames.is_empty() {
            debug!("Video pHash: no decodable frames");
            return Ok(None);
        }

        let mut bytes = Vec::with_capacity(frames.len() * 8);
        for frame in frames {
            if cancel.is_cancelled() {
                debug!("Video pHash: cancelled at frame {}", frame.index);
                return Ok(None);
            }
            bytes.extend_from_slice(&self.frame_hash(frame)?.to_be_bytes());
        }

        debug!("Video pHash: combined {} frame hashes", frames.len());
        Ok(Some(sha256_hex(&bytes)))
    }

    /// 64-bit pHash of one frame: bit `k` (MSB first, row-major over the
    /// low-frequency block) is set when coefficient `k` exceeds the median.
    pub fn frame_hash(&self, frame: &GrayFrame) -> MediaResult<u64> {
        let img: GrayImage = ImageBuffer::from_raw(frame.width, frame.height, frame.pixels.clone())
            .ok_or_else(|| {
                MediaError::internal(format!(
                    "Frame {} has {} bytes, expected {}x{}",
                    frame.index,
                    frame.pixels.len(),
                    frame.width,
                    frame.height
                ))
            })?;

        let size = self.params.resize;
        let resized = imageops::resize(&img, size, size, FilterType::Lanczos3);
        let pixels: Vec<f64> = resized.pixels().map(|p| p.0[0] as f64).collect();

        let coeffs = dct2_low_block(&pixels, size as usize, self.params.dct_block);
        let threshold = median(&coeffs);

        let bits = coeffs.len().min(64);
        Ok(coeffs
            .iter()
            .take(bits)
            .enumerate()
            .filter(|(_, c)| **c > threshold)
            .fold(0u64, |hash, (k, _)| hash | (1u64 << (63 - k))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, f: impl Fn(u32, u32) -> u8) -> GrayFrame {
        let (width, height) = (64, 48);
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        GrayFrame {
            index,
            width,
            height,
            pixels,
        }
    }

    #[test]
    fn test_no_frames_yields_none() {
        assert_eq!(VideoPerceptualHasher::default().hash(&[]).unwrap(), None);
    }

    #[test]
    fn test_black_frame_hash_is_zero() {
        // every coefficient equals the median, so no bit is set
        let hasher = VideoPerceptualHasher::default();
        assert_eq!(hasher.frame_hash(&frame(0, |_, _| 0)).unwrap(), 0);
    }

    #[test]
    fn test_gradient_sets_bits() {
        let hasher = VideoPerceptualHasher::default();
        let h = hasher.frame_hash(&frame(0, |x, _| (x * 4) as u8)).unwrap();
        assert_ne!(h, 0);
        // DC is the largest coefficient of a non-negative image
        assert_eq!(h >> 63, 1);
    }

    #[test]
    fn test_frame_order_matters() {
        let hasher = VideoPerceptualHasher::default();
        let a = frame(0, |x, _| (x * 4) as u8);
        let b = frame(1, |_, y| (y * 5) as u8);

        let ab = hasher.hash(&[a.clone(), b.clone()]).unwrap().unwrap();
        let ba = hasher.hash(&[b.clone(), a.clone()]).unwrap().unwrap();
        assert_ne!(ab, ba);
        assert_eq!(ab, hasher.hash(&[a, b]).unwrap().unwrap());
    }

    #[test]
    fn test_cancelled_hash_yields_none() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let frames = [frame(0, |x, _| (x * 4) as u8)];
        assert_eq!(
            VideoPerceptualHasher::default().hash_until(&frames, &cancel).unwrap(),
            None
        );
    }

    #[test]
    fn test_mismatched_buffer_is_error() {
        let mut bad = frame(3, |_, _| 0);
        bad.pixels.truncate(10);
        assert!(VideoPerceptualHasher::default().frame_hash(&bad).is_err());
    }
}
