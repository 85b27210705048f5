//! Image compression, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` |
//! | **JPEG** | `JpegEncoder` at the configured quality |
//! | **PNG** | `PngEncoder`, best lossless compression |
//!
//! The module is split into:
//! - **Parameters**: what to compress, where, at which quality
//! - **Backend**: [`ImageCompressor`] trait + [`RustCompressor`]

pub mod backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, CompressOutcome, ImageCompressor, Kept};
pub use params::{CompressParams, ImageKind, Quality};
pub use rust_backend::RustCompressor;
