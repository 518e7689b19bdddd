//! Tensor utilities shared by preprocessing and attribution.
//!
//! Everything here operates on 2-D `f32` planes: grayscale X-ray intensities
//! and class-activation maps. Interpolation follows the half-pixel-center
//! convention (`align_corners=false`) so resampled maps line up with the
//! resized input images they are overlaid on.

use crate::core::constants::NORMALIZE_EPSILON;
use crate::core::tensor::{Tensor2D, Tensor4D};
use ndarray::Array4;

/// Resamples a 2-D plane to `(out_h, out_w)` with bilinear interpolation.
///
/// Sample positions use half-pixel centers and are clamped to the source
/// extent, so corner values are preserved and no out-of-bounds reads occur.
/// Degenerate requests (`0` output size or an empty source) yield an empty
/// plane.
pub fn resize_bilinear(plane: &Tensor2D, out_h: usize, out_w: usize) -> Tensor2D {
    let (in_h, in_w) = plane.dim();
    if in_h == 0 || in_w == 0 || out_h == 0 || out_w == 0 {
        return Tensor2D::zeros((out_h, out_w));
    }
    if in_h == out_h && in_w == out_w {
        return plane.clone();
    }

    let scale_y = in_h as f32 / out_h as f32;
    let scale_x = in_w as f32 / out_w as f32;

    Tensor2D::from_shape_fn((out_h, out_w), |(oy, ox)| {
        let src_y = ((oy as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (in_h - 1) as f32);
        let src_x = ((ox as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (in_w - 1) as f32);

        let y0 = src_y.floor() as usize;
        let x0 = src_x.floor() as usize;
        let y1 = (y0 + 1).min(in_h - 1);
        let x1 = (x0 + 1).min(in_w - 1);
        let dy = src_y - y0 as f32;
        let dx = src_x - x0 as f32;

        let top = plane[[y0, x0]] * (1.0 - dx) + plane[[y0, x1]] * dx;
        let bottom = plane[[y1, x0]] * (1.0 - dx) + plane[[y1, x1]] * dx;
        top * (1.0 - dy) + bottom * dy
    })
}

/// Rescales a plane linearly so its values span `[0, 1]`.
///
/// A plane with no spread (constant values) maps to all zeros instead of
/// dividing by zero.
pub fn normalize_unit(plane: &Tensor2D) -> Tensor2D {
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
    plane.mapv(|v| (v - min) / spread)
}

/// Wraps a single grayscale plane as a `(1, 1, H, W)` model input batch.
pub fn plane_to_batch(plane: &Tensor2D) -> Tensor4D {
    let (h, w) = plane.dim();
    Array4::from_shape_fn((1, 1, h, w), |(_, _, y, x)| plane[[y, x]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn resize_identity_when_shape_matches() {
        let plane = array![[1.0, 2.0], [3.0, 4.0]];
        let out = resize_bilinear(&plane, 2, 2);
        assert_eq!(out, plane);
    }

    #[test]
    fn resize_constant_plane_stays_constant() {
        let plane = Tensor2D::from_elem((3, 3), 0.5);
        let out = resize_bilinear(&plane, 7, 5);
        assert_eq!(out.dim(), (7, 5));
        for &v in out.iter() {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn resize_upsamples_within_value_range() {
        let plane = array![[0.0, 1.0], [1.0, 0.0]];
        let out = resize_bilinear(&plane, 4, 4);
        assert_eq!(out.dim(), (4, 4));
        for &v in out.iter() {
            assert!((0.0..=1.0).contains(&v), "value {} escaped input range", v);
        }
    }

    #[test]
    fn resize_downsample_averages_neighbours() {
        // Halving a 4x4 checkerboard with half-pixel centers lands every
        // sample exactly between two 0/1 cells.
        let plane = Tensor2D::from_shape_fn((4, 4), |(y, x)| ((y + x) % 2) as f32);
        let out = resize_bilinear(&plane, 2, 2);
        for &v in out.iter() {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn normalize_unit_spans_full_range() {
        let plane = array![[2.0, 4.0], [6.0, 8.0]];
        let out = normalize_unit(&plane);
        assert!((out[[0, 0]] - 0.0).abs() < 1e-6);
        assert!((out[[1, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_unit_constant_plane_is_zero() {
        let plane = Tensor2D::from_elem((3, 3), 7.5);
        let out = normalize_unit(&plane);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn plane_to_batch_shape() {
        let plane = Tensor2D::zeros((5, 6));
        let batch = plane_to_batch(&plane);
        assert_eq!(batch.shape(), &[1, 1, 5, 6]);
    }
}
