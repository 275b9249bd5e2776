//! Bounding-box downscaling.

use super::calculations::fit_within;
use super::params::BoundingBox;
use image::DynamicImage;
use image::imageops::FilterType;

/// Scale `image` down to fit inside `max_width × max_height`.
///
/// Aspect ratio is preserved. A source that already fits is returned at its
/// own dimensions (never upscaled). Resampling uses Lanczos3.
pub fn resize_to_bounding_box(image: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let source = (image.width(), image.height());
    let (w, h) = fit_within(source, BoundingBox::new(max_width, max_height));
    if (w, h) == source {
        return image.clone();
    }
    image.resize_exact(w, h, FilterType::Lanczos3)
}
