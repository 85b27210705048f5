//! Pure Rust compression backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::ImageReader` with format sniffing |
//! | Encode JPEG | `image::codecs::jpeg::JpegEncoder::new_with_quality` |
//! | Encode PNG | `image::codecs::png::PngEncoder` (best compression, adaptive filter) |
//!
//! PNG re-encoding is lossless. The smaller of the source bytes and the new
//! encoding is written, so an already-optimized file passes through unchanged.

use super::backend::{BackendError, CompressOutcome, ImageCompressor, Kept};
use super::params::{CompressParams, ImageKind};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::path::Path;

pub struct RustCompressor;

impl RustCompressor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustCompressor {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(bytes: &[u8], path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// JPEG has no alpha channel and no 16-bit depth; flatten anything else to RGB8.
fn jpeg_compatible(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn encode(img: DynamicImage, kind: ImageKind, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let result = match kind {
        ImageKind::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality as u8);
            jpeg_compatible(img).write_with_encoder(encoder)
        }
        ImageKind::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)
        }
    };
    result.map_err(|e| BackendError::ProcessingFailed(format!("{kind:?} encode failed: {e}")))?;
    Ok(buf)
}

impl ImageCompressor for RustCompressor {
    fn compress(&self, params: &CompressParams) -> Result<CompressOutcome, BackendError> {
        let original = std::fs::read(&params.source)?;
        let img = decode(&original, &params.source)?;
        let encoded = encode(img, params.kind, params.quality.value())?;

        let (bytes, kept) = if encoded.len() < original.len() {
            (&encoded, Kept::Compressed)
        } else {
            (&original, Kept::Original)
        };
        std::fs::write(&params.output, bytes)?;

        Ok(CompressOutcome {
            original_bytes: original.len() as u64,
            written_bytes: bytes.len() as u64,
            kept,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use image::{ImageEncoder, RgbImage, RgbaImage};

    /// Create a noisy JPEG at maximum quality so re-encoding at a lower
    /// quality shrinks it.
    fn create_test_jpeg(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([
                ((x * 7 + y * 13) % 256) as u8,
                ((x * y) % 256) as u8,
                ((x ^ y) % 256) as u8,
            ])
        });
        let file = std::fs::File::create(path).unwrap();
        let writer = std::io::BufWriter::new(file);
        JpegEncoder::new_with_quality(writer, 100)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
    }

    /// Create a PNG with no compression at all.
    fn create_test_png(path: &Path, width: u32, height: u32) {
        let img = RgbaImage::from_fn(width, height, |x, _| image::Rgba([(x % 4) as u8, 0, 0, 255]));
        let file = std::fs::File::create(path).unwrap();
        let writer = std::io::BufWriter::new(file);
        PngEncoder::new_with_quality(writer, CompressionType::Fast, FilterType::NoFilter)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .unwrap();
    }

    fn params(source: &Path, output: &Path, kind: ImageKind, quality: u32) -> CompressParams {
        CompressParams {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            kind,
            quality: Quality::new(quality),
        }
    }

    #[test]
    fn jpeg_is_recompressed_smaller() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("photo.jpg");
        let output = tmp.path().join("out.jpg");
        create_test_jpeg(&source, 256, 256);

        let outcome = RustCompressor::new()
            .compress(&params(&source, &output, ImageKind::Jpeg, 40))
            .unwrap();

        assert_eq!(outcome.kept, Kept::Compressed);
        assert!(outcome.written_bytes < outcome.original_bytes);
        assert_eq!(
            std::fs::metadata(&output).unwrap().len(),
            outcome.written_bytes
        );
        let (w, h) = image::image_dimensions(&output).unwrap();
        assert_eq!((w, h), (256, 256));
    }

    #[test]
    fn png_recompression_is_lossless() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("icon.png");
        let output = tmp.path().join("icon-out.png");
        create_test_png(&source, 128, 64);

        let outcome = RustCompressor::new()
            .compress(&params(&source, &output, ImageKind::Png, 85))
            .unwrap();

        assert!(outcome.written_bytes <= outcome.original_bytes);
        let before = image::open(&source).unwrap().to_rgba8();
        let after = image::open(&output).unwrap().to_rgba8();
        assert_eq!(before, after);
    }

    #[test]
    fn output_is_never_larger_than_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("tiny.png");
        let output = tmp.path().join("tiny-out.png");
        create_test_png(&source, 1, 1);

        let outcome = RustCompressor::new()
            .compress(&params(&source, &output, ImageKind::Png, 85))
            .unwrap();

        assert!(outcome.written_bytes <= outcome.original_bytes);
        if outcome.kept == Kept::Original {
            assert_eq!(std::fs::read(&source).unwrap(), std::fs::read(&output).unwrap());
        }
    }

    #[test]
    fn rgba_source_encodes_as_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("alpha.png");
        let output = tmp.path().join("alpha.jpg");
        create_test_png(&source, 32, 32);

        assert!(
            RustCompressor::new()
                .compress(&params(&source, &output, ImageKind::Jpeg, 85))
                .is_ok()
        );
    }

    #[test]
    fn corrupt_input_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("broken.jpg");
        std::fs::write(&source, b"not a jpeg").unwrap();

        let result = RustCompressor::new().compress(&params(
            &source,
            &tmp.path().join("o.jpg"),
            ImageKind::Jpeg,
            85,
        ));
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn missing_input_is_io_error() {
        let result = RustCompressor::new().compress(&params(
            Path::new("/nonexistent/a.png"),
            Path::new("/nonexistent/b.png"),
            ImageKind::Png,
            85,
        ));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }
}
