//! Compression backend trait and shared types.
//!
//! The [`ImageCompressor`] trait is the one operation the media task needs:
//! take an image, write the smallest acceptable encoding of it.
//!
//! The production implementation is
//! [`RustCompressor`](super::rust_backend::RustCompressor), built on the
//! `image` crate's pure-Rust encoders.

use super::params::CompressParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Which bytes ended up at the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kept {
    /// The re-encoded image was smaller.
    Compressed,
    /// Re-encoding did not help; the source bytes were written unchanged.
    Original,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOutcome {
    pub original_bytes: u64,
    pub written_bytes: u64,
    pub kept: Kept,
}

impl CompressOutcome {
    pub fn saved_bytes(&self) -> u64 {
        self.original_bytes.saturating_sub(self.written_bytes)
    }
}

/// Trait for compression backends.
///
/// Implementations must never write an output larger than the source.
pub trait ImageCompressor: Sync {
    fn compress(&self, params: &CompressParams) -> Result<CompressOutcome, BackendError>;
}
