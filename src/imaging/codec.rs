//! Codec layer: decode any allow-listed raster format, encode to a target.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Format sniffing | `image::guess_format` (magic bytes, not extensions) |
//! | Header-only dimensions | `image::ImageReader::into_dimensions` |
//! | Decode (JPEG, PNG, GIF, WebP, TIFF, BMP) | `image` crate (pure Rust decoders) |
//! | Encode → WebP (lossy) | `webp::Encoder` (libwebp) |
//! | Encode → JPEG / PNG | `image::codecs::{jpeg, png}` |
//!
//! The codec has no knowledge of entities or paths: bytes in, bytes out.
//! Size and pixel limits are checked from the byte slice and the image
//! header before a full decode is attempted, so a hostile or corrupt input
//! fails fast instead of allocating a huge raster.

use super::calculations::max_encoded_len;
use super::params::{Quality, TargetFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

/// Input formats whose decoders are compiled in.
const ALLOWED_INPUTS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
];

/// File extensions accepted as source images by the batch driver.
const SOURCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "tif", "tiff", "bmp"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported input format: {0}")]
    UnsupportedInputFormat(String),
    #[error("corrupt input: {0}")]
    CorruptInput(String),
    #[error("input too large: {0}")]
    InputTooLarge(String),
    #[error("encode failed: {0}")]
    EncodeFailure(String),
}

/// Returns the file extensions the pipeline treats as source images.
pub fn supported_input_extensions() -> &'static [&'static str] {
    SOURCE_EXTENSIONS
}

/// Fail-fast bounds applied before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeLimits {
    /// Maximum encoded input size in bytes.
    pub max_input_bytes: u64,
    /// Maximum `width × height` read from the image header.
    pub max_pixels: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 50 * 1024 * 1024,
            max_pixels: 50_000_000,
        }
    }
}

/// Image codec used by the orchestrator.
///
/// The production implementation is [`RustCodec`]. Tests substitute
/// wrappers that inject failures for specific variants. A codec is shared
/// across the batch worker threads, hence `Send + Sync`.
pub trait ImageCodec: Send + Sync {
    /// Decode raw bytes into a raster.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError>;

    /// Encode a raster into `format` at `quality`.
    fn encode(
        &self,
        image: &DynamicImage,
        format: TargetFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError>;

    /// Decode then encode in one step.
    fn transcode(
        &self,
        bytes: &[u8],
        format: TargetFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError> {
        let image = self.decode(bytes)?;
        self.encode(&image, format, quality)
    }
}

/// Transcode with the default [`RustCodec`] and default limits.
pub fn transcode(
    input: &[u8],
    format: TargetFormat,
    quality: Quality,
) -> Result<Vec<u8>, CodecError> {
    RustCodec::default().transcode(input, format, quality)
}

/// Identify the input format from magic bytes, enforcing the allow-list.
pub fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, CodecError> {
    let format = image::guess_format(bytes)
        .map_err(|_| CodecError::UnsupportedInputFormat("unrecognized signature".into()))?;
    if ALLOWED_INPUTS.contains(&format) {
        Ok(format)
    } else {
        Err(CodecError::UnsupportedInputFormat(format!("{format:?}")))
    }
}

/// The target that re-encodes a source in its own format, if one exists.
pub fn preserving_target(format: ImageFormat) -> Option<TargetFormat> {
    match format {
        ImageFormat::Jpeg => Some(TargetFormat::Jpeg),
        ImageFormat::Png => Some(TargetFormat::Png),
        ImageFormat::WebP => Some(TargetFormat::WebP),
        _ => None,
    }
}

/// Pure Rust decoders plus libwebp for lossy WebP output.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCodec {
    limits: DecodeLimits,
}

impl RustCodec {
    pub fn new(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    fn check_dimensions(&self, bytes: &[u8], format: ImageFormat) -> Result<(), CodecError> {
        let (w, h) = ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()
            .map_err(|e| CodecError::CorruptInput(e.to_string()))?;
        let pixels = w as u64 * h as u64;
        if pixels == 0 {
            return Err(CodecError::CorruptInput(format!("zero-sized image {w}x{h}")));
        }
        if pixels > self.limits.max_pixels {
            return Err(CodecError::InputTooLarge(format!(
                "{w}x{h} exceeds {} pixels",
                self.limits.max_pixels
            )));
        }
        Ok(())
    }
}

impl ImageCodec for RustCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        if bytes.len() as u64 > self.limits.max_input_bytes {
            return Err(CodecError::InputTooLarge(format!(
                "{} bytes exceeds {} byte limit",
                bytes.len(),
                self.limits.max_input_bytes
            )));
        }
        let format = sniff_format(bytes)?;
        self.check_dimensions(bytes, format)?;

        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        let mut limits = Limits::default();
        // RGBA16 is the widest buffer any allowed decoder produces.
        limits.max_alloc = Some(self.limits.max_pixels.saturating_mul(8));
        reader.limits(limits);
        reader
            .decode()
            .map_err(|e| CodecError::CorruptInput(e.to_string()))
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: TargetFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError> {
        let has_alpha = image.color().has_alpha();
        let encoded = match format {
            TargetFormat::WebP => encode_webp(image, quality)?,
            TargetFormat::Jpeg => encode_jpeg(image, quality)?,
            TargetFormat::Png => encode_png(image)?,
        };

        let channels = if has_alpha && format != TargetFormat::Jpeg { 4 } else { 3 };
        let limit = max_encoded_len((image.width(), image.height()), channels);
        if encoded.len() as u64 > limit {
            return Err(CodecError::EncodeFailure(format!(
                "{} output of {} bytes exceeds {} byte bound",
                format.extension(),
                encoded.len(),
                limit
            )));
        }
        Ok(encoded)
    }
}

/// Lossy WebP through libwebp. Alpha is kept when the source has it.
fn encode_webp(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let (w, h) = (image.width(), image.height());
    let memory = if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode_simple(false, quality.value() as f32)
    } else {
        let rgb = image.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), w, h).encode_simple(false, quality.value() as f32)
    }
    .map_err(|e| CodecError::EncodeFailure(format!("WebP encode failed: {e:?}")))?;
    Ok(memory.to_vec())
}

fn encode_jpeg(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
    rgb.write_with_encoder(encoder)
        .map_err(|e| CodecError::EncodeFailure(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    image
        .write_with_encoder(PngEncoder::new(&mut buf))
        .map_err(|e| CodecError::EncodeFailure(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}
