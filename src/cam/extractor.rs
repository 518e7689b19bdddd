//! The class-activation-map extractor contract and map fusion.

use ndarray::Axis;

use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::{Tensor2D, Tensor3D, Tensor4D};
use crate::models::classifier::{Classifier, TracedForward};
use crate::utils::tensor::resize_bilinear;

/// Everything a backend may consult while explaining one candidate.
///
/// The traced forward pass belongs to the candidate being explained, so
/// scores, activations and the resulting map stay self-consistent.
pub struct AttributionContext<'a> {
    /// The classifier under explanation.
    pub classifier: &'a dyn Classifier,
    /// The preprocessed `(1, 1, S, S)` input batch.
    pub input: &'a Tensor4D,
    /// The candidate's own traced forward pass.
    pub traced: &'a TracedForward,
}

/// One attribution backend.
///
/// An extractor turns a traced forward pass into one or more raw maps at
/// target-layer resolution. Multi-map backends are fused downstream with
/// [`fuse_cams`]; normalization and upsampling to input resolution happen
/// in the orchestrator so every backend reports comparable maps.
pub trait CamExtractor: Send + Sync {
    /// Canonical method name, used in logs and backend errors.
    fn name(&self) -> &str;

    /// Computes the raw maps for one class. At least one map on success.
    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>>;
}

/// Fuses raw maps: resample everything to the largest spatial size, then
/// take the elementwise maximum. A single map passes through unchanged.
pub fn fuse_cams(maps: Vec<Tensor2D>) -> CxrResult<Tensor2D> {
    let mut iter = maps.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| CxrError::invalid_input("no maps to fuse"))?;

    let mut target = first.dim();
    let rest: Vec<Tensor2D> = iter.collect();
    for map in &rest {
        let (h, w) = map.dim();
        target = (target.0.max(h), target.1.max(w));
    }

    let mut fused = resize_bilinear(&first, target.0, target.1);
    for map in &rest {
        let resampled = resize_bilinear(map, target.0, target.1);
        fused.zip_mut_with(&resampled, |acc, &v| *acc = acc.max(v));
    }
    Ok(fused)
}

/// Sums activation channels under the given per-channel weights.
pub(crate) fn weighted_activation_sum(
    activations: &Tensor3D,
    weights: &[f32],
) -> CxrResult<Tensor2D> {
    let (channels, h, w) = activations.dim();
    if weights.len() != channels {
        return Err(CxrError::invalid_input(format!(
            "{} channel weights for a {}-channel activation map",
            weights.len(),
            channels
        )));
    }
    let mut sum = Tensor2D::zeros((h, w));
    for (ch, &weight) in weights.iter().enumerate() {
        if weight == 0.0 {
            continue;
        }
        let plane = activations.index_axis(Axis(0), ch);
        sum.zip_mut_with(&plane, |acc, &a| *acc += weight * a);
    }
    Ok(sum)
}

/// Clamps negative values to zero in place and returns the map.
pub(crate) fn relu_2d(mut map: Tensor2D) -> Tensor2D {
    map.mapv_inplace(|v| v.max(0.0));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn single_map_fuses_to_itself() {
        let map = array![[0.1f32, 0.9], [0.4, 0.2]];
        let fused = fuse_cams(vec![map.clone()]).unwrap();
        assert_eq!(fused, map);
    }

    #[test]
    fn fusion_resamples_to_largest_and_takes_max() {
        let small = array![[1.0f32]];
        let large = array![[0.2f32, 0.2], [0.2, 0.2]];
        let fused = fuse_cams(vec![small, large]).unwrap();
        assert_eq!(fused.dim(), (2, 2));
        // The 1x1 map broadcasts its single value everywhere and wins.
        assert!(fused.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn fusing_nothing_is_an_error() {
        assert!(fuse_cams(Vec::new()).is_err());
    }

    #[test]
    fn weighted_sum_honors_weights() {
        let acts = Array3::from_shape_fn((2, 2, 2), |(ch, _, _)| (ch + 1) as f32);
        let sum = weighted_activation_sum(&acts, &[1.0, -0.5]).unwrap();
        assert!(sum.iter().all(|&v| (v - 0.0).abs() < 1e-6));
        assert!(weighted_activation_sum(&acts, &[1.0]).is_err());
    }

    #[test]
    fn relu_clamps_negatives_only() {
        let clamped = relu_2d(array![[-1.0f32, 2.0]]);
        assert_eq!(clamped, array![[0.0f32, 2.0]]);
    }
}
