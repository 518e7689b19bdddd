//! The classifier contract the pipeline runs against.
//!
//! A [`Classifier`] wraps one trained chest X-ray model behind a small
//! capability surface: the ordered label list, the designated target layer
//! for attribution, plain prediction, a traced forward pass that also
//! captures target-layer activations, and class gradients with respect to
//! those activations. Backends that cannot differentiate report the gradient
//! capability as unsupported; score-based CAM methods keep working there.

use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::{Tensor3D, Tensor4D};
use serde::{Deserialize, Serialize};

/// Opaque reference to the layer activations are read from.
///
/// For ONNX-backed models this is the name of the feature-map output in the
/// exported graph; synthetic models carry a descriptive label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayer {
    name: String,
}

impl TargetLayer {
    /// Creates a target layer handle with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the layer/output name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for TargetLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Load state of the classifier slot in a session.
///
/// Loading a model is an expensive acquisition that can take seconds; the
/// session exposes this state so a caller can surface a busy indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelState {
    /// No classifier has been loaded yet.
    #[default]
    NotLoaded,
    /// A load is in progress.
    Loading,
    /// A classifier is loaded and ready for inference.
    Ready,
}

/// The result of one traced forward pass.
///
/// `scores` and `activations` come from the same pass, so per-candidate
/// attribution stays self-consistent even if the backend were stochastic.
#[derive(Debug, Clone)]
pub struct TracedForward {
    /// Per-class probabilities in `[0, 1]`, one per label.
    pub scores: Vec<f32>,
    /// Target-layer activations of shape `(channels, height, width)`.
    pub activations: Tensor3D,
}

/// A trained classification model exposed to the pipeline.
pub trait Classifier: Send + Sync {
    /// Identifier of the loaded model, for logs and error messages.
    fn name(&self) -> &str;

    /// Ordered class labels; index and label form a stable bijection for
    /// the lifetime of the loaded model.
    fn labels(&self) -> &[String];

    /// Square input side length expected by `predict`.
    fn input_side(&self) -> u32;

    /// The designated attribution target layer, if the model has one.
    fn target_layer(&self) -> Option<&TargetLayer>;

    /// Runs one forward pass, returning the score vector.
    fn predict(&self, input: &Tensor4D) -> CxrResult<Vec<f32>>;

    /// Runs one forward pass, returning scores and target-layer activations.
    fn forward_traced(&self, input: &Tensor4D) -> CxrResult<TracedForward>;

    /// Gradient of one class score with respect to the traced activations.
    ///
    /// The returned tensor matches `traced.activations` in shape. Backends
    /// without a differentiable path return `CxrError::Unsupported`.
    fn class_gradients(&self, traced: &TracedForward, class_index: usize) -> CxrResult<Tensor3D>;
}

/// Validates that a batch tensor is a single `(1, 1, side, side)` image.
pub(crate) fn validate_input_shape(input: &Tensor4D, side: u32) -> CxrResult<()> {
    let expected = [1, 1, side as usize, side as usize];
    if input.shape() != expected {
        return Err(CxrError::invalid_input(format!(
            "expected input of shape {:?}, got {:?}",
            expected,
            input.shape()
        )));
    }
    Ok(())
}

/// Weights of the global-average-pool + linear classification head.
///
/// The exported chest X-ray classifiers end in `sigmoid(W · GAP(A) + b)`
/// over the designated feature map `A`. Knowing `W` and `b` makes the class
/// gradient with respect to `A` analytic, which is what the gradient-based
/// CAM methods need from an otherwise opaque inference backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierHead {
    /// Row-per-class weight matrix, `weight[class][channel]`.
    pub weight: Vec<Vec<f32>>,
    /// Per-class bias.
    pub bias: Vec<f32>,
}

impl ClassifierHead {
    /// Checks the head dimensions against the expected class/channel counts.
    pub fn validate(&self, classes: usize, channels: usize) -> CxrResult<()> {
        if self.weight.len() != classes || self.bias.len() != classes {
            return Err(CxrError::invalid_input(format!(
                "classifier head covers {} classes, model has {}",
                self.weight.len(),
                classes
            )));
        }
        if let Some(row) = self.weight.iter().find(|row| row.len() != channels) {
            return Err(CxrError::invalid_input(format!(
                "classifier head row covers {} channels, feature map has {}",
                row.len(),
                channels
            )));
        }
        Ok(())
    }

    /// Applies the head to a feature map: `sigmoid(W · GAP(A) + b)`.
    pub fn forward(&self, activations: &Tensor3D) -> CxrResult<Vec<f32>> {
        let (channels, h, w) = activations.dim();
        self.validate(self.weight.len(), channels)?;
        if h == 0 || w == 0 {
            return Err(CxrError::invalid_input(
                "feature map has no spatial extent",
            ));
        }

        let area = (h * w) as f32;
        let pooled: Vec<f32> = (0..channels)
            .map(|ch| activations.index_axis(ndarray::Axis(0), ch).sum() / area)
            .collect();

        Ok(self
            .weight
            .iter()
            .zip(&self.bias)
            .map(|(row, &bias)| {
                let logit: f32 = row.iter().zip(&pooled).map(|(w, p)| w * p).sum::<f32>() + bias;
                sigmoid(logit)
            })
            .collect())
    }

    /// Analytic gradient of `sigmoid` class score w.r.t. the feature map.
    ///
    /// For `p = sigmoid(W · GAP(A) + b)` the derivative is constant per
    /// channel: `p (1 - p) · W[class][ch] / (H · W)`.
    pub fn activation_gradient(
        &self,
        class_index: usize,
        probability: f32,
        shape: (usize, usize, usize),
    ) -> CxrResult<Tensor3D> {
        let (channels, h, w) = shape;
        let row = self.weight.get(class_index).ok_or_else(|| {
            CxrError::invalid_input(format!(
                "class index {} outside the {}-class head",
                class_index,
                self.weight.len()
            ))
        })?;
        if row.len() != channels {
            return Err(CxrError::invalid_input(format!(
                "classifier head row covers {} channels, feature map has {}",
                row.len(),
                channels
            )));
        }
        if h == 0 || w == 0 {
            return Err(CxrError::invalid_input(
                "feature map has no spatial extent",
            ));
        }

        let gate = probability * (1.0 - probability);
        let area = (h * w) as f32;
        Ok(Tensor3D::from_shape_fn((channels, h, w), |(ch, _, _)| {
            gate * row[ch] / area
        }))
    }
}

/// Numerically stable logistic function.
pub(crate) fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
