//! Shared test utilities: synthetic images and media-tree fixtures.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let media = media_fixture();
//! let facade = media.path().join("projects/Villa Project/facade.jpg");
//! assert!(facade.exists());
//! ```

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Synthetic images
// =========================================================================

/// Deterministic gradient so encoders have something to compress.
fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

pub fn png_bytes(width: u32, height: u32, alpha: bool) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    if alpha {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, ((x * 7) % 256) as u8])
        })
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    } else {
        gradient(width, height)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
    }
    buf.into_inner()
}

pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, jpeg_bytes(width, height)).unwrap();
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, png_bytes(width, height, true)).unwrap();
}

// =========================================================================
// Fixture setup
// =========================================================================

/// A media root with one project and one service:
///
/// ```text
/// projects/Villa Project/facade.jpg        800×600
/// projects/Villa Project/album/pool.jpg    640×480
/// projects/Villa Project/album/hall.png    320×320
/// services/Lighting/icon.png               128×128
/// ```
pub fn media_fixture() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let villa = tmp.path().join("projects/Villa Project");
    write_jpeg(&villa.join("facade.jpg"), 800, 600);
    write_jpeg(&villa.join("album/pool.jpg"), 640, 480);
    write_png(&villa.join("album/hall.png"), 320, 320);
    write_png(&tmp.path().join("services/Lighting/icon.png"), 128, 128);
    tmp
}

/// Every file below `root`, relative and sorted.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}
