//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::BoundingBox;

/// Calculate the dimensions of `source` scaled to fit inside `bbox`.
///
/// Aspect ratio is preserved and the result never exceeds the source
/// resolution: a source that already fits is returned unchanged. Each side
/// is rounded to the nearest pixel and is at least 1.
///
/// # Examples
/// ```
/// # use derivo::imaging::{fit_within, BoundingBox};
/// // 2000x1500 into a 300x300 box → 300x225
/// assert_eq!(fit_within((2000, 1500), BoundingBox::new(300, 300)), (300, 225));
///
/// // Already smaller than the box → unchanged
/// assert_eq!(fit_within((200, 100), BoundingBox::new(300, 300)), (200, 100));
/// ```
pub fn fit_within(source: (u32, u32), bbox: BoundingBox) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return source;
    }
    if src_w <= bbox.max_width && src_h <= bbox.max_height {
        return source;
    }

    let scale_w = bbox.max_width as f64 / src_w as f64;
    let scale_h = bbox.max_height as f64 / src_h as f64;
    let scale = scale_w.min(scale_h);

    let w = ((src_w as f64 * scale).round() as u32).clamp(1, bbox.max_width.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, bbox.max_height.max(1));
    (w, h)
}

/// Upper bound on the encoded size of an image, in bytes.
///
/// The uncompressed raster plus a fixed allowance for container headers.
/// An encoder that produces more than this has expanded the input and its
/// output is rejected.
pub fn max_encoded_len(dims: (u32, u32), channels: u8) -> u64 {
    const CONTAINER_ALLOWANCE: u64 = 4096;
    dims.0 as u64 * dims.1 as u64 * channels as u64 + CONTAINER_ALLOWANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // fit_within tests
    // =========================================================================

    #[test]
    fn fit_landscape_into_square_box() {
        // 2000x1500 (4:3) → width-bound: 300 x 225
        assert_eq!(fit_within((2000, 1500), BoundingBox::new(300, 300)), (300, 225));
        assert_eq!(fit_within((2000, 1500), BoundingBox::new(600, 600)), (600, 450));
        assert_eq!(
            fit_within((2000, 1500), BoundingBox::new(1200, 1200)),
            (1200, 900)
        );
    }

    #[test]
    fn fit_portrait_into_square_box() {
        // 1500x2000 → height-bound: 225 x 300
        assert_eq!(fit_within((1500, 2000), BoundingBox::new(300, 300)), (225, 300));
    }

    #[test]
    fn fit_never_upscales() {
        assert_eq!(fit_within((120, 80), BoundingBox::new(300, 300)), (120, 80));
    }

    #[test]
    fn fit_exact_box_is_unchanged() {
        assert_eq!(fit_within((300, 300), BoundingBox::new(300, 300)), (300, 300));
    }

    #[test]
    fn fit_only_one_side_exceeds() {
        // 400x100 into 300x300 → 300x75
        assert_eq!(fit_within((400, 100), BoundingBox::new(300, 300)), (300, 75));
    }

    #[test]
    fn fit_extreme_aspect_keeps_one_pixel() {
        // 10000x1 into 300x300 → 300x1 (rounded 0.03 clamps to 1)
        assert_eq!(fit_within((10000, 1), BoundingBox::new(300, 300)), (300, 1));
    }

    #[test]
    fn fit_is_deterministic() {
        let bbox = BoundingBox::new(600, 600);
        assert_eq!(fit_within((3333, 1777), bbox), fit_within((3333, 1777), bbox));
    }

    #[test]
    fn fit_non_square_box() {
        // 1000x1000 into 800x400 → height-bound: 400x400
        assert_eq!(fit_within((1000, 1000), BoundingBox::new(800, 400)), (400, 400));
    }

    // =========================================================================
    // max_encoded_len tests
    // =========================================================================

    #[test]
    fn max_encoded_len_counts_channels() {
        assert_eq!(max_encoded_len((10, 10), 3), 300 + 4096);
        assert_eq!(max_encoded_len((10, 10), 4), 400 + 4096);
    }
}
