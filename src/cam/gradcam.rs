//! Gradient-weighted attribution backends.
//!
//! These methods weight the target-layer activations by statistics of the
//! class-score gradient from the candidate's own traced forward pass. They
//! require the gradient capability on the classifier; backends without it
//! fail with an unsupported-capability error that the session isolates to
//! the affected result slot.

use ndarray::Axis;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::cam::extractor::{relu_2d, weighted_activation_sum, AttributionContext, CamExtractor};
use crate::core::constants::NORMALIZE_EPSILON;
use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::{Tensor2D, Tensor3D};

/// Classic Grad-CAM: channel weights are globally averaged gradients.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradCam;

impl CamExtractor for GradCam {
    fn name(&self) -> &str {
        "GradCAM"
    }

    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>> {
        let grads = ctx.classifier.class_gradients(ctx.traced, class_index)?;
        let channels = grads.dim().0;
        let weights: Vec<f32> = (0..channels)
            .map(|ch| {
                let plane = grads.index_axis(Axis(0), ch);
                plane.mean().unwrap_or(0.0)
            })
            .collect();
        let cam = weighted_activation_sum(&ctx.traced.activations, &weights)?;
        Ok(vec![relu_2d(cam)])
    }
}

/// Computes the Grad-CAM++ channel weights for one gradient tensor.
///
/// `alpha = g^2 / (2 g^2 + sum(g^3 * a))` per pixel, summed against the
/// positive part of the gradient.
fn gradcampp_weights(activations: &Tensor3D, grads: &Tensor3D) -> CxrResult<Vec<f32>> {
    if activations.dim() != grads.dim() {
        return Err(CxrError::invalid_input(format!(
            "gradient shape {:?} does not match activation shape {:?}",
            grads.dim(),
            activations.dim()
        )));
    }
    let channels = grads.dim().0;
    let mut weights = vec![0.0f32; channels];
    for (ch, weight) in weights.iter_mut().enumerate() {
        let g = grads.index_axis(Axis(0), ch);
        let a = activations.index_axis(Axis(0), ch);
        let spread: f32 = g.iter().zip(a.iter()).map(|(&g, &a)| g.powi(3) * a).sum();
        for &gv in g.iter() {
            let denom = 2.0 * gv * gv + spread;
            if denom.abs() > NORMALIZE_EPSILON {
                *weight += (gv * gv / denom) * gv.max(0.0);
            }
        }
    }
    Ok(weights)
}

/// Grad-CAM++: pixel-wise alpha weighting of positive gradients.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradCamPp;

impl CamExtractor for GradCamPp {
    fn name(&self) -> &str {
        "GradCAMpp"
    }

    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>> {
        let grads = ctx.classifier.class_gradients(ctx.traced, class_index)?;
        let weights = gradcampp_weights(&ctx.traced.activations, &grads)?;
        let cam = weighted_activation_sum(&ctx.traced.activations, &weights)?;
        Ok(vec![relu_2d(cam)])
    }
}

/// Smooth Grad-CAM++: Grad-CAM++ over gradient moments averaged across
/// noise-perturbed forward passes.
#[derive(Debug, Clone)]
pub struct SmoothGradCamPp {
    num_samples: usize,
    std_dev: f32,
    seed: Option<u64>,
}

impl Default for SmoothGradCamPp {
    fn default() -> Self {
        Self {
            num_samples: 4,
            std_dev: 0.3,
            seed: None,
        }
    }
}

impl SmoothGradCamPp {
    /// Creates a smoother with the given sample count and noise level.
    pub fn new(num_samples: usize, std_dev: f32) -> CxrResult<Self> {
        if num_samples == 0 {
            return Err(CxrError::invalid_input("num_samples must be at least 1"));
        }
        if !std_dev.is_finite() || std_dev < 0.0 {
            return Err(CxrError::invalid_input(format!(
                "noise level {std_dev} is not a non-negative finite number"
            )));
        }
        Ok(Self {
            num_samples,
            std_dev,
            seed: None,
        })
    }

    /// Pins the noise RNG for reproducible maps.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl CamExtractor for SmoothGradCamPp {
    fn name(&self) -> &str {
        "SmoothGradCAMpp"
    }

    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>> {
        let dim = ctx.traced.activations.dim();
        let mut rng = self.rng();
        let mut g1 = Tensor3D::zeros(dim);
        let mut g2 = Tensor3D::zeros(dim);
        let mut g3 = Tensor3D::zeros(dim);

        for _ in 0..self.num_samples {
            let noisy = ctx
                .input
                .mapv(|v| v + self.std_dev * rng.sample::<f32, _>(StandardNormal));
            let traced = ctx.classifier.forward_traced(&noisy)?;
            let grads = ctx.classifier.class_gradients(&traced, class_index)?;
            if grads.dim() != dim {
                return Err(CxrError::invalid_input(format!(
                    "noisy gradient shape {:?} does not match activation shape {:?}",
                    grads.dim(),
                    dim
                )));
            }
            g1.zip_mut_with(&grads, |acc, &g| *acc += g);
            g2.zip_mut_with(&grads, |acc, &g| *acc += g * g);
            g3.zip_mut_with(&grads, |acc, &g| *acc += g * g * g);
        }

        let n = self.num_samples as f32;
        g1.mapv_inplace(|v| v / n);
        g2.mapv_inplace(|v| v / n);
        g3.mapv_inplace(|v| v / n);

        // Grad-CAM++ alpha over the averaged moments, against the clean
        // activations of the candidate's own pass.
        let acts = &ctx.traced.activations;
        let channels = dim.0;
        let mut weights = vec![0.0f32; channels];
        for (ch, weight) in weights.iter_mut().enumerate() {
            let a = acts.index_axis(Axis(0), ch);
            let m2 = g2.index_axis(Axis(0), ch);
            let m3 = g3.index_axis(Axis(0), ch);
            let m1 = g1.index_axis(Axis(0), ch);
            let spread: f32 = m3.iter().zip(a.iter()).map(|(&g, &a)| g * a).sum();
            for (&v2, &v1) in m2.iter().zip(m1.iter()) {
                let denom = 2.0 * v2 + spread;
                if denom.abs() > NORMALIZE_EPSILON {
                    *weight += (v2 / denom) * v1.max(0.0);
                }
            }
        }

        let cam = weighted_activation_sum(acts, &weights)?;
        Ok(vec![relu_2d(cam)])
    }
}

/// XGrad-CAM: gradients scaled by activations and normalized per channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct XGradCam;

impl CamExtractor for XGradCam {
    fn name(&self) -> &str {
        "XGradCAM"
    }

    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>> {
        let grads = ctx.classifier.class_gradients(ctx.traced, class_index)?;
        let acts = &ctx.traced.activations;
        if acts.dim() != grads.dim() {
            return Err(CxrError::invalid_input(format!(
                "gradient shape {:?} does not match activation shape {:?}",
                grads.dim(),
                acts.dim()
            )));
        }
        let channels = grads.dim().0;
        let weights: Vec<f32> = (0..channels)
            .map(|ch| {
                let g = grads.index_axis(Axis(0), ch);
                let a = acts.index_axis(Axis(0), ch);
                let scaled: f32 = g.iter().zip(a.iter()).map(|(&g, &a)| g * a).sum();
                scaled / (a.sum() + NORMALIZE_EPSILON)
            })
            .collect();
        let cam = weighted_activation_sum(acts, &weights)?;
        Ok(vec![relu_2d(cam)])
    }
}

/// Layer-CAM: element-wise gating of activations by positive gradients.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerCam;

impl CamExtractor for LayerCam {
    fn name(&self) -> &str {
        "LayerCAM"
    }

    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>> {
        let grads = ctx.classifier.class_gradients(ctx.traced, class_index)?;
        let acts = &ctx.traced.activations;
        if acts.dim() != grads.dim() {
            return Err(CxrError::invalid_input(format!(
                "gradient shape {:?} does not match activation shape {:?}",
                grads.dim(),
                acts.dim()
            )));
        }
        let (_, h, w) = acts.dim();
        let mut cam = Tensor2D::zeros((h, w));
        for (g_plane, a_plane) in grads
            .axis_iter(Axis(0))
            .zip(acts.axis_iter(Axis(0)))
        {
            for ((acc, &g), &a) in cam.iter_mut().zip(g_plane.iter()).zip(a_plane.iter()) {
                *acc += g.max(0.0) * a;
            }
        }
        Ok(vec![relu_2d(cam)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::Tensor4D;
    use crate::models::classifier::Classifier;
    use crate::models::synthetic::SyntheticClassifier;
    use ndarray::Array4;

    fn fixture() -> (SyntheticClassifier, Tensor4D) {
        let model = SyntheticClassifier::tiny().unwrap();
        let side = model.input_side() as usize;
        let input = Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            ((y * side + x) as f32 / (side * side) as f32) * 2048.0 - 1024.0
        });
        (model, input)
    }

    fn run(extractor: &dyn CamExtractor, class_index: usize) -> Vec<Tensor2D> {
        let (model, input) = fixture();
        let traced = model.forward_traced(&input).unwrap();
        let ctx = AttributionContext {
            classifier: &model,
            input: &input,
            traced: &traced,
        };
        extractor.extract(&ctx, class_index).unwrap()
    }

    #[test]
    fn gradcam_yields_one_nonnegative_feature_map() {
        let maps = run(&GradCam, 0);
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].dim(), (4, 4));
        assert!(maps[0].iter().all(|&v| v >= 0.0 && v.is_finite()));
    }

    #[test]
    fn gradcampp_yields_one_nonnegative_feature_map() {
        let maps = run(&GradCamPp, 1);
        assert_eq!(maps.len(), 1);
        assert!(maps[0].iter().all(|&v| v >= 0.0 && v.is_finite()));
    }

    #[test]
    fn xgradcam_and_layercam_match_feature_geometry() {
        for extractor in [&XGradCam as &dyn CamExtractor, &LayerCam] {
            let maps = run(extractor, 2);
            assert_eq!(maps.len(), 1);
            assert_eq!(maps[0].dim(), (4, 4));
        }
    }

    #[test]
    fn smooth_gradcampp_is_reproducible_with_a_seed() {
        let extractor = SmoothGradCamPp::new(3, 0.5).unwrap().with_seed(7);
        let first = run(&extractor, 0);
        let second = run(&extractor, 0);
        assert_eq!(first[0], second[0]);
    }

    #[test]
    fn smooth_gradcampp_rejects_zero_samples() {
        assert!(SmoothGradCamPp::new(0, 0.3).is_err());
        assert!(SmoothGradCamPp::new(4, f32::NAN).is_err());
    }

    #[test]
    fn gradcampp_weights_reject_shape_mismatch() {
        let acts = Tensor3D::zeros((2, 3, 3));
        let grads = Tensor3D::zeros((2, 2, 2));
        assert!(gradcampp_weights(&acts, &grads).is_err());
    }
}
