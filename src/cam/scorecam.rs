//! Score-based attribution backends.
//!
//! These methods never differentiate. Each activation channel becomes a
//! soft input mask; the class score of the re-masked input measures how
//! much that channel's region contributes. Softmax over the per-channel
//! scores gives the fusion weights. The cost is one forward pass per
//! channel (times the sample count for the smoothed variants), which is
//! why these methods stay usable on backends without head weights.

use ndarray::Axis;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use crate::cam::extractor::{relu_2d, weighted_activation_sum, AttributionContext, CamExtractor};
use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::{Tensor2D, Tensor4D};
use crate::utils::tensor::{normalize_unit, resize_bilinear};

/// Upsamples every activation channel to input size, normalized to [0, 1].
fn channel_masks(ctx: &AttributionContext<'_>) -> Vec<Tensor2D> {
    let (_, _, h, w) = ctx.input.dim();
    ctx.traced
        .activations
        .axis_iter(Axis(0))
        .map(|plane| normalize_unit(&resize_bilinear(&plane.to_owned(), h, w)))
        .collect()
}

/// Multiplies the single-channel input batch by a spatial mask.
fn apply_mask(input: &Tensor4D, mask: &Tensor2D) -> CxrResult<Tensor4D> {
    let (_, _, h, w) = input.dim();
    if mask.dim() != (h, w) {
        return Err(CxrError::invalid_input(format!(
            "mask shape {:?} does not match input spatial shape {:?}",
            mask.dim(),
            (h, w)
        )));
    }
    let mut masked = input.clone();
    let mut plane = masked.index_axis_mut(Axis(0), 0).index_axis_move(Axis(0), 0);
    plane.zip_mut_with(mask, |v, &m| *v *= m);
    Ok(masked)
}

/// One forward pass, returning the requested class score.
fn class_score(
    ctx: &AttributionContext<'_>,
    input: &Tensor4D,
    class_index: usize,
) -> CxrResult<f32> {
    let scores = ctx.classifier.predict(input)?;
    scores.get(class_index).copied().ok_or_else(|| {
        CxrError::invalid_input(format!(
            "class index {} outside the {}-class score vector",
            class_index,
            scores.len()
        ))
    })
}

/// Numerically stable softmax over channel scores.
fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|&v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Weighs activations by softmaxed per-channel scores and clamps.
fn weighted_cam(
    ctx: &AttributionContext<'_>,
    channel_scores: &[f32],
) -> CxrResult<Vec<Tensor2D>> {
    let weights = softmax(channel_scores);
    let cam = weighted_activation_sum(&ctx.traced.activations, &weights)?;
    Ok(vec![relu_2d(cam)])
}

/// Score-CAM: one masked forward pass per activation channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreCam;

impl CamExtractor for ScoreCam {
    fn name(&self) -> &str {
        "ScoreCAM"
    }

    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>> {
        let masks = channel_masks(ctx);
        debug!(channels = masks.len(), "scoring masked forwards");
        let mut cics = Vec::with_capacity(masks.len());
        for mask in &masks {
            let masked = apply_mask(ctx.input, mask)?;
            cics.push(class_score(ctx, &masked, class_index)?);
        }
        weighted_cam(ctx, &cics)
    }
}

/// SS-CAM: Score-CAM with Gaussian noise added to each mask, averaged
/// over several samples.
#[derive(Debug, Clone)]
pub struct SsCam {
    num_samples: usize,
    std_dev: f32,
    seed: Option<u64>,
}

impl Default for SsCam {
    fn default() -> Self {
        Self {
            num_samples: 35,
            std_dev: 2.0,
            seed: None,
        }
    }
}

impl SsCam {
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
}

impl CamExtractor for SsCam {
    fn name(&self) -> &str {
        "SSCAM"
    }

    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>> {
        let masks = channel_masks(ctx);
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!(
            channels = masks.len(),
            samples = self.num_samples,
            "scoring noise-smoothed masked forwards"
        );
        let mut cics = Vec::with_capacity(masks.len());
        for mask in &masks {
            let mut total = 0.0f32;
            for _ in 0..self.num_samples {
                let noisy =
                    mask.mapv(|m| m + self.std_dev * rng.sample::<f32, _>(StandardNormal));
                let masked = apply_mask(ctx.input, &noisy)?;
                total += class_score(ctx, &masked, class_index)?;
            }
            cics.push(total / self.num_samples as f32);
        }
        weighted_cam(ctx, &cics)
    }
}

/// IS-CAM: Score-CAM integrated over linearly scaled masks.
#[derive(Debug, Clone)]
pub struct IsCam {
    num_samples: usize,
}

impl Default for IsCam {
    fn default() -> Self {
        Self { num_samples: 10 }
    }
}

impl IsCam {
    /// Creates an integrator with the given number of mask fractions.
    pub fn new(num_samples: usize) -> CxrResult<Self> {
        if num_samples == 0 {
            return Err(CxrError::invalid_input("num_samples must be at least 1"));
        }
        Ok(Self { num_samples })
    }
}

impl CamExtractor for IsCam {
    fn name(&self) -> &str {
        "ISCAM"
    }

    fn extract(
        &self,
        ctx: &AttributionContext<'_>,
        class_index: usize,
    ) -> CxrResult<Vec<Tensor2D>> {
        let masks = channel_masks(ctx);
        debug!(
            channels = masks.len(),
            steps = self.num_samples,
            "scoring integrated masked forwards"
        );
        let mut cics = Vec::with_capacity(masks.len());
        for mask in &masks {
            let mut total = 0.0f32;
            for step in 0..self.num_samples {
                let coefficient = (step + 1) as f32 / self.num_samples as f32;
                let scaled = mask.mapv(|m| coefficient * m);
                let masked = apply_mask(ctx.input, &scaled)?;
                total += class_score(ctx, &masked, class_index)?;
            }
            cics.push(total / self.num_samples as f32);
        }
        weighted_cam(ctx, &cics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classifier::Classifier;
    use crate::models::synthetic::SyntheticClassifier;
    use ndarray::{array, Array4};

    fn fixture() -> (SyntheticClassifier, Tensor4D) {
        let model = SyntheticClassifier::tiny().unwrap();
        let side = model.input_side() as usize;
        let input = Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            ((y + x) as f32 / (2 * side) as f32) * 2048.0 - 1024.0
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
    fn scorecam_yields_one_nonnegative_feature_map() {
        let maps = run(&ScoreCam, 0);
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].dim(), (4, 4));
        assert!(maps[0].iter().all(|&v| v >= 0.0 && v.is_finite()));
    }

    #[test]
    fn sscam_is_reproducible_with_a_seed() {
        let extractor = SsCam::new(3, 1.0).unwrap().with_seed(11);
        let first = run(&extractor, 1);
        let second = run(&extractor, 1);
        assert_eq!(first[0], second[0]);
    }

    #[test]
    fn iscam_yields_one_feature_map() {
        let extractor = IsCam::new(4).unwrap();
        let maps = run(&extractor, 2);
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].dim(), (4, 4));
    }

    #[test]
    fn zero_samples_are_rejected() {
        assert!(SsCam::new(0, 2.0).is_err());
        assert!(IsCam::new(0).is_err());
    }

    #[test]
    fn softmax_distributes_to_unity() {
        let weights = softmax(&[0.1, 0.9, 0.5]);
        let total: f32 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(weights[1] > weights[0]);
    }

    #[test]
    fn mask_shape_mismatch_is_rejected() {
        let input = Array4::zeros((1, 1, 4, 4));
        let mask = array![[1.0f32, 1.0], [1.0, 1.0]];
        assert!(apply_mask(&input, &mask).is_err());
    }
}
