//! Object storage for proof media and diagnostic artifacts.
//!
//! This crate provides:
//! - The `ObjectStore` trait (fetch to file, write-once put, existence check)
//! - A Cloudflare R2 / S3-compatible implementation
//! - A local directory implementation
//! - Backend selection from the environment

pub mod client;
pub mod error;
pub mod local;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use local::LocalObjectStore;
pub use store::{open_from_env, ObjectStore, StorageBackend};
