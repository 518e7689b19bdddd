//! Utility functions for images, tensors, and visualization.

pub mod image;
pub mod tensor;
pub mod visualization;

pub use image::{decode_image, dynamic_to_rgb, load_image, rgb_to_luma_plane};
pub use tensor::{normalize_unit, plane_to_batch, resize_bilinear};
pub use visualization::{AnnotationConfig, annotate_overlay, jet_color, overlay_mask};
