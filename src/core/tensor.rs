//! Tensor aliases used at the model boundary.
//!
//! The pipeline works on owned `f32` arrays throughout. Activations and
//! saliency maps are small, so clones are cheap relative to inference.

use ndarray::{Array2, Array3, Array4};

/// Rank 2 tensor of `f32` values, used for grayscale planes and saliency maps.
pub type Tensor2D = Array2<f32>;

/// Rank 3 tensor of `f32` values laid out as (channels, height, width).
pub type Tensor3D = Array3<f32>;

/// Rank 4 tensor of `f32` values laid out as (batch, channels, height, width).
pub type Tensor4D = Array4<f32>;
