//! Parameter types for image operations.
//!
//! These types describe *what* to produce, not *how*. The
//! [`optimize`](crate::optimize) orchestrator decides which variants to
//! build from them, and the [`codec`](super::codec) does the pixel work.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 85). Clamped on construction.
//! - [`TargetFormat`]: output encoding. Derived assets are always WebP.
//! - [`SizeClass`]: the four derived variants: canonical, small, medium, large.
//! - [`BoundingBox`]: maximum width × height a sized variant must fit inside.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality(pub u32);

impl Quality {
    /// Quality for re-encodes that keep the source's own format.
    pub const PRESERVE: Quality = Quality(88);

    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Encoding applied by [`ImageCodec::encode`](super::codec::ImageCodec::encode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Lossy WebP. Every derived variant uses this.
    WebP,
    /// Format-preserving re-encode of a JPEG source.
    Jpeg,
    /// Format-preserving re-encode of a PNG source (quality is ignored).
    Png,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::WebP => "webp",
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Png => "png",
        }
    }

    /// Target implied by an output file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "webp" => Some(TargetFormat::WebP),
            "jpg" | "jpeg" => Some(TargetFormat::Jpeg),
            "png" => Some(TargetFormat::Png),
            _ => None,
        }
    }
}

/// One of the fixed derived variants generated per source image.
///
/// Ordered by pixel budget: `Small < Medium < Large < Canonical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
    /// Full original resolution, re-encoded only.
    Canonical,
}

impl SizeClass {
    /// Generation order used by the orchestrator and in reports.
    pub const ALL: [SizeClass; 4] = [
        SizeClass::Canonical,
        SizeClass::Small,
        SizeClass::Medium,
        SizeClass::Large,
    ];

    /// Filename suffix appended to the source stem. Canonical has none.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            SizeClass::Canonical => None,
            SizeClass::Small => Some("small"),
            SizeClass::Medium => Some("medium"),
            SizeClass::Large => Some("large"),
        }
    }

    pub fn as_str(self) -> &'static str {
        self.suffix().unwrap_or("canonical")
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "canonical" | "full" => Ok(SizeClass::Canonical),
            "small" => Ok(SizeClass::Small),
            "medium" => Ok(SizeClass::Medium),
            "large" => Ok(SizeClass::Large),
            other => Err(format!("unknown size class: {other}")),
        }
    }
}

/// Maximum output dimensions for a sized variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub max_width: u32,
    pub max_height: u32,
}

impl BoundingBox {
    pub const fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }
}
