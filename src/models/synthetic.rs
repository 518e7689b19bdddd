//! Deterministic in-process classifiers for tests and weight-free demos.
//!
//! A [`SyntheticClassifier`] mimics the shape of the exported checkpoints
//! without any weights on disk: it block-pools the windowed input into a
//! small multi-channel feature map, then applies a fixed GAP+linear head.
//! Every quantity is analytic, so the gradient capability is exact and the
//! whole attribution pipeline can be exercised end to end offline.

use std::sync::Arc;

use crate::core::constants::{MODEL_INPUT_SIDE, WINDOW_HIGH};
use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::{Tensor3D, Tensor4D};
use crate::models::classifier::{
    validate_input_shape, Classifier, ClassifierHead, TargetLayer, TracedForward,
};
use crate::models::library::{ModelLibrary, ModelSource};
use crate::models::xrv::XRV_PATHOLOGIES;

/// Identifiers served by [`SyntheticModelLibrary`], in display order.
pub const SYNTHETIC_MODEL_CHOICES: [&str; 2] = ["synthetic-cxr-lite", "synthetic-cxr-tiny"];

/// A weight-free classifier with an analytic forward and gradient.
#[derive(Debug, Clone)]
pub struct SyntheticClassifier {
    name: String,
    labels: Vec<String>,
    input_side: u32,
    channels: usize,
    feature_side: usize,
    head: ClassifierHead,
    target_layer: Option<TargetLayer>,
}

impl SyntheticClassifier {
    /// Creates a classifier with the given geometry.
    ///
    /// `feature_side` must divide `input_side` so block pooling is exact.
    pub fn new(
        name: impl Into<String>,
        labels: Vec<String>,
        input_side: u32,
        channels: usize,
        feature_side: usize,
    ) -> CxrResult<Self> {
        if labels.is_empty() {
            return Err(CxrError::invalid_input("label list is empty"));
        }
        if channels == 0 || feature_side == 0 {
            return Err(CxrError::invalid_input(
                "feature geometry must be non-zero",
            ));
        }
        if input_side as usize % feature_side != 0 {
            return Err(CxrError::invalid_input(format!(
                "feature side {feature_side} does not divide input side {input_side}"
            )));
        }

        // Fixed pseudo-random head so runs are reproducible across builds.
        let weight = (0..labels.len())
            .map(|class| {
                (0..channels)
                    .map(|ch| ((class * 31 + ch * 17) % 23) as f32 / 22.0 - 0.5)
                    .collect()
            })
            .collect();
        let head = ClassifierHead {
            weight,
            bias: vec![0.0; labels.len()],
        };

        Ok(Self {
            name: name.into(),
            labels,
            input_side,
            channels,
            feature_side,
            head,
            target_layer: Some(TargetLayer::new("block_pool")),
        })
    }

    /// A 224-input model over the full pathology label set.
    pub fn lite() -> CxrResult<Self> {
        Self::new(
            "synthetic-cxr-lite",
            XRV_PATHOLOGIES.iter().map(|s| s.to_string()).collect(),
            MODEL_INPUT_SIDE,
            8,
            7,
        )
    }

    /// A small 64-input model for fast tests.
    pub fn tiny() -> CxrResult<Self> {
        Self::new(
            "synthetic-cxr-tiny",
            XRV_PATHOLOGIES[..6].iter().map(|s| s.to_string()).collect(),
            64,
            4,
            4,
        )
    }

    /// Drops the target layer, turning attribution requests into errors.
    pub fn without_target_layer(mut self) -> Self {
        self.target_layer = None;
        self
    }

    /// The fixed head, exposed for gradient cross-checks in tests.
    pub fn head(&self) -> &ClassifierHead {
        &self.head
    }

    /// Block-pools the input and modulates it into a multi-channel map.
    ///
    /// The windowed input is rescaled to `[0, 1]` and each channel applies a
    /// smooth deterministic spatial mask, so different channels attend to
    /// different regions the way trained features do.
    fn feature_map(&self, input: &Tensor4D) -> Tensor3D {
        let block = self.input_side as usize / self.feature_side;
        let area = (block * block) as f32;
        let plane = input.index_axis(ndarray::Axis(0), 0);
        let plane = plane.index_axis(ndarray::Axis(0), 0);

        Tensor3D::from_shape_fn(
            (self.channels, self.feature_side, self.feature_side),
            |(ch, fy, fx)| {
                let mut sum = 0.0f32;
                for dy in 0..block {
                    for dx in 0..block {
                        sum += plane[[fy * block + dy, fx * block + dx]];
                    }
                }
                let pooled = (sum / area / WINDOW_HIGH + 1.0) / 2.0;
                let mask = 0.5
                    + 0.5 * (ch as f32 * 1.7 + fy as f32 * 0.9 + fx as f32 * 0.45).sin();
                pooled * mask
            },
        )
    }
}

impl Classifier for SyntheticClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_side(&self) -> u32 {
        self.input_side
    }

    fn target_layer(&self) -> Option<&TargetLayer> {
        self.target_layer.as_ref()
    }

    fn predict(&self, input: &Tensor4D) -> CxrResult<Vec<f32>> {
        validate_input_shape(input, self.input_side)?;
        self.head.forward(&self.feature_map(input))
    }

    fn forward_traced(&self, input: &Tensor4D) -> CxrResult<TracedForward> {
        validate_input_shape(input, self.input_side)?;
        if self.target_layer.is_none() {
            return Err(CxrError::NoTargetLayer {
                model: self.name.clone(),
            });
        }
        let activations = self.feature_map(input);
        let scores = self.head.forward(&activations)?;
        Ok(TracedForward {
            scores,
            activations,
        })
    }

    fn class_gradients(&self, traced: &TracedForward, class_index: usize) -> CxrResult<Tensor3D> {
        let probability = *traced.scores.get(class_index).ok_or_else(|| {
            CxrError::invalid_input(format!(
                "class index {} outside the {}-class score vector",
                class_index,
                traced.scores.len()
            ))
        })?;
        self.head
            .activation_gradient(class_index, probability, traced.activations.dim())
    }
}

/// Serves the built-in synthetic classifiers.
#[derive(Debug)]
pub struct SyntheticModelLibrary {
    choices: Vec<String>,
}

impl SyntheticModelLibrary {
    pub fn new() -> Self {
        Self {
            choices: SYNTHETIC_MODEL_CHOICES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for SyntheticModelLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLibrary for SyntheticModelLibrary {
    fn source(&self) -> ModelSource {
        ModelSource::Synthetic
    }

    fn choices(&self) -> &[String] {
        &self.choices
    }

    fn load(&self, identifier: &str) -> CxrResult<Arc<dyn Classifier>> {
        match identifier {
            "synthetic-cxr-lite" => Ok(Arc::new(SyntheticClassifier::lite()?)),
            "synthetic-cxr-tiny" => Ok(Arc::new(SyntheticClassifier::tiny()?)),
            other => Err(CxrError::model_load(other, "unknown model identifier")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn ramp_input(side: u32) -> Tensor4D {
        let side = side as usize;
        Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            (y * side + x) as f32 / (side * side) as f32 * 2048.0 - 1024.0
        })
    }

    #[test]
    fn forward_is_deterministic_and_bounded() {
        let model = SyntheticClassifier::tiny().unwrap();
        let input = ramp_input(model.input_side());
        let first = model.predict(&input).unwrap();
        let second = model.predict(&input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), model.labels().len());
        assert!(first.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn traced_forward_exposes_feature_geometry() {
        let model = SyntheticClassifier::tiny().unwrap();
        let traced = model.forward_traced(&ramp_input(model.input_side())).unwrap();
        assert_eq!(traced.activations.dim(), (4, 4, 4));
        assert_eq!(traced.scores.len(), 6);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let model = SyntheticClassifier::tiny().unwrap();
        let traced = model.forward_traced(&ramp_input(model.input_side())).unwrap();
        let grad = model.class_gradients(&traced, 2).unwrap();

        let eps = 1e-2;
        let mut perturbed = traced.activations.clone();
        perturbed[[1, 2, 3]] += eps;
        let bumped = model.head().forward(&perturbed).unwrap();
        let numeric = (bumped[2] - traced.scores[2]) / eps;
        assert!(
            (grad[[1, 2, 3]] - numeric).abs() < 1e-4,
            "analytic {} vs numeric {}",
            grad[[1, 2, 3]],
            numeric
        );
    }

    #[test]
    fn missing_target_layer_blocks_traced_forward() {
        let model = SyntheticClassifier::tiny().unwrap().without_target_layer();
        assert!(model.target_layer().is_none());
        let err = model.forward_traced(&ramp_input(model.input_side())).unwrap_err();
        assert!(matches!(err, CxrError::NoTargetLayer { .. }));
        // Plain prediction is unaffected.
        assert!(model.predict(&ramp_input(model.input_side())).is_ok());
    }

    #[test]
    fn wrong_input_shape_is_rejected() {
        let model = SyntheticClassifier::tiny().unwrap();
        let wrong = Array4::zeros((1, 1, 32, 32));
        assert!(matches!(
            model.predict(&wrong).unwrap_err(),
            CxrError::InvalidInput { .. }
        ));
    }

    #[test]
    fn geometry_must_divide_input() {
        let labels = vec!["A".to_string(), "B".to_string()];
        assert!(SyntheticClassifier::new("bad", labels, 224, 4, 5).is_err());
    }

    #[test]
    fn library_serves_both_models() {
        let library = SyntheticModelLibrary::new();
        assert_eq!(library.source(), ModelSource::Synthetic);
        assert_eq!(library.choices().len(), 2);
        let model = library.load("synthetic-cxr-lite").unwrap();
        assert_eq!(model.labels().len(), XRV_PATHOLOGIES.len());
        assert!(library.load("synthetic-cxr-huge").is_err());
    }
}
