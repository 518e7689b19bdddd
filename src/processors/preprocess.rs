//! Preprocessing of chest X-ray images into classifier input form.
//!
//! The preprocessing chain mirrors the transform the classifiers were
//! trained with: luminance reduction, center-crop to a square of side
//! `max(height, width)`, bilinear resize to the model input size, then a
//! linear rescale of the observed intensity range into the signed window
//! the models expect. The un-rescaled square is kept alongside as the
//! overlay background.

use crate::core::constants::{MODEL_INPUT_SIDE, NORMALIZE_EPSILON, WINDOW_HIGH, WINDOW_LOW};
use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::Tensor2D;
use crate::utils::image::rgb_to_luma_plane;
use crate::utils::tensor::resize_bilinear;
use image::RgbImage;
use ndarray::s;
use tracing::debug;

/// Converts arbitrary RGB images into fixed-size grayscale model inputs.
///
/// `preprocess` returns two planes of identical shape `(side, side)`:
/// `transformed` keeps the `[0, 1]` display intensities for the overlay
/// background, `rescaled` carries the windowed values fed to the model.
#[derive(Debug, Clone, Copy)]
pub struct XrayPreprocessor {
    input_side: u32,
}

impl Default for XrayPreprocessor {
    fn default() -> Self {
        Self::new(MODEL_INPUT_SIDE)
    }
}

impl XrayPreprocessor {
    /// Creates a preprocessor producing `(input_side, input_side)` planes.
    pub fn new(input_side: u32) -> Self {
        Self { input_side }
    }

    /// Returns the square side length of produced planes.
    pub fn input_side(&self) -> u32 {
        self.input_side
    }

    /// Runs the full preprocessing chain on one source image.
    ///
    /// Returns `(transformed, rescaled)`. A constant-intensity image cannot
    /// be window-rescaled; it maps to the window midpoint (all zeros) rather
    /// than dividing by zero.
    ///
    /// # Errors
    ///
    /// Returns `DegenerateImage` if the source has no pixels.
    pub fn preprocess(&self, image: &RgbImage) -> CxrResult<(Tensor2D, Tensor2D)> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CxrError::degenerate_image("image has no pixels"));
        }

        let plane = rgb_to_luma_plane(image);
        let square = center_crop_to_square(&plane);
        let side = self.input_side as usize;
        let transformed = resize_bilinear(&square, side, side);
        let rescaled = rescale_to_window(&transformed);

        debug!(
            source_w = width,
            source_h = height,
            side,
            "preprocessed X-ray image"
        );
        Ok((transformed, rescaled))
    }
}

/// Embeds a plane centered in a square of side `max(height, width)`.
///
/// The crop side equals the longer axis, so the shorter axis is zero-padded
/// symmetrically; the longer axis is carried over unchanged.
fn center_crop_to_square(plane: &Tensor2D) -> Tensor2D {
    let (h, w) = plane.dim();
    if h == w {
        return plane.clone();
    }
    let side = h.max(w);
    let mut square = Tensor2D::zeros((side, side));
    let y0 = (side - h) / 2;
    let x0 = (side - w) / 2;
    square.slice_mut(s![y0..y0 + h, x0..x0 + w]).assign(plane);
    square
}

/// Linearly rescales observed intensities into `[WINDOW_LOW, WINDOW_HIGH]`.
///
/// The observed minimum maps to the window floor and the observed maximum to
/// the window ceiling. Constant planes map to the window midpoint.
fn rescale_to_window(plane: &Tensor2D) -> Tensor2D {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in plane.iter() {
        min = min.min(v);
        max = max.max(v);
    }
    let spread = max - min;
    if !spread.is_finite() || spread <= NORMALIZE_EPSILON {
        return Tensor2D::zeros(plane.dim());
    }
    let width = WINDOW_HIGH - WINDOW_LOW;
    plane.mapv(|v| width * (v - min) / spread + WINDOW_LOW)
}
