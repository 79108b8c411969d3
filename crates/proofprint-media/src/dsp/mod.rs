//! Numeric building blocks shared by the analyzers.

pub mod dct;
pub mod digest;
pub mod mel;
pub mod stft;

pub use dct::{dct2_low_block, median};
pub use digest::{series_digest, sha256_hex, z_normalize};
pub use mel::MelFilterBank;
pub use stft::Stft;
