//! Image processing: decode, resize, re-encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Sniff + limits** | `image::guess_format`, header-only `into_dimensions` |
//! | **Resize** | `resize_exact` with Lanczos3, bounding-box math in [`fit_within`] |
//! | **Encode → WebP** | libwebp via the `webp` crate (lossy) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Quality, target format, size classes, bounding boxes
//! - **Resize**: [`resize_to_bounding_box`]
//! - **Codec**: [`ImageCodec`] trait + [`RustCodec`]

mod calculations;
pub mod codec;
mod params;
pub mod resize;

pub use calculations::fit_within;
pub use codec::{
    CodecError, DecodeLimits, ImageCodec, RustCodec, preserving_target, sniff_format,
    supported_input_extensions, transcode,
};
pub use params::{BoundingBox, Quality, SizeClass, TargetFormat};
pub use resize::resize_to_bounding_box;
