//! Utility functions for image handling.
//!
//! Loading and decoding use the image crate directly; the conversion helpers
//! bridge between pixel buffers and the `f32` planes the pipeline computes
//! on.

use crate::core::constants::LUMA_WEIGHTS;
use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::Tensor2D;
use image::{DynamicImage, RgbImage};

/// Converts a DynamicImage to an RgbImage.
pub fn dynamic_to_rgb(img: DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Loads an image from a file path and converts it to RgbImage.
///
/// # Errors
///
/// Returns `CxrError::ImageLoad` if the file cannot be opened or decoded.
pub fn load_image(path: &std::path::Path) -> CxrResult<RgbImage> {
    let img = image::open(path).map_err(CxrError::ImageLoad)?;
    Ok(dynamic_to_rgb(img))
}

/// Decodes raw image bytes (PNG, JPEG, ...) into an RgbImage.
pub fn decode_image(bytes: &[u8]) -> CxrResult<RgbImage> {
    let img = image::load_from_memory(bytes).map_err(CxrError::ImageLoad)?;
    Ok(dynamic_to_rgb(img))
}

/// Collapses an RGB image to a luminance plane with values in `[0, 1]`.
///
/// Uses the Rec. 601 coefficients, matching the grayscale conversion the
/// classifiers were trained against.
pub fn rgb_to_luma_plane(img: &RgbImage) -> Tensor2D {
    let (width, height) = img.dimensions();
    Tensor2D::from_shape_fn((height as usize, width as usize), |(y, x)| {
        let pixel = img.get_pixel(x as u32, y as u32);
        let [r, g, b] = pixel.0;
        (LUMA_WEIGHTS[0] * r as f32 + LUMA_WEIGHTS[1] * g as f32 + LUMA_WEIGHTS[2] * b as f32)
            / 255.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_of_pure_channels_follows_rec601() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([0, 255, 0]));
        img.put_pixel(2, 0, image::Rgb([0, 0, 255]));
        let plane = rgb_to_luma_plane(&img);
        assert!((plane[[0, 0]] - 0.2989).abs() < 1e-4);
        assert!((plane[[0, 1]] - 0.5870).abs() < 1e-4);
        assert!((plane[[0, 2]] - 0.1140).abs() < 1e-4);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_image(&[0, 1, 2, 3]),
            Err(CxrError::ImageLoad(_))
        ));
    }
}
