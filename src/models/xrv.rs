//! ONNX-backed chest X-ray classifiers exported from torchxrayvision.
//!
//! Each checkpoint lives in its own bundle directory under the configured
//! models directory:
//!
//! ```text
//! models/
//!   densenet121-res224-all/
//!     model.onnx   graph with outputs `scores` and `features`
//!     head.json    optional GAP+linear head weights for gradient CAMs
//! ```
//!
//! The exported graph takes a `(1, 1, 224, 224)` windowed image named `x`
//! and declares two outputs: the sigmoid class scores and the last DenseNet
//! feature map, which doubles as the attribution target layer. Bundles that
//! ship without `head.json` still classify and still support the
//! score-based CAM methods; the gradient-based ones report the missing
//! capability instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::constants::MODEL_INPUT_SIDE;
use crate::core::errors::{CxrError, CxrResult};
use crate::core::inference::{OrtInfer, TensorOutput};
use crate::core::tensor::{Tensor3D, Tensor4D};
use crate::models::classifier::{
    validate_input_shape, Classifier, ClassifierHead, TargetLayer, TracedForward,
};
use crate::models::library::{ModelLibrary, ModelSource};

/// DenseNet-121 checkpoints the library knows how to serve, in display order.
pub const XRV_MODEL_CHOICES: [&str; 7] = [
    "densenet121-res224-all",
    "densenet121-res224-rsna",
    "densenet121-res224-nih",
    "densenet121-res224-pc",
    "densenet121-res224-chex",
    "densenet121-res224-mimic_nb",
    "densenet121-res224-mimic_ch",
];

/// Pathology labels shared by the DenseNet-121 checkpoints, in output order.
pub const XRV_PATHOLOGIES: [&str; 18] = [
    "Atelectasis",
    "Consolidation",
    "Infiltration",
    "Pneumothorax",
    "Edema",
    "Emphysema",
    "Fibrosis",
    "Effusion",
    "Pneumonia",
    "Pleural_Thickening",
    "Cardiomegaly",
    "Nodule",
    "Mass",
    "Hernia",
    "Lung Lesion",
    "Fracture",
    "Lung Opacity",
    "Enlarged Cardiomediastinum",
];

const MODEL_FILE: &str = "model.onnx";
const HEAD_FILE: &str = "head.json";
const INPUT_NAME: &str = "x";
const SCORES_OUTPUT: &str = "scores";
const FEATURES_OUTPUT: &str = "features";

/// A classifier backed by an exported ONNX graph.
#[derive(Debug)]
pub struct OnnxClassifier {
    identifier: String,
    labels: Vec<String>,
    infer: OrtInfer,
    target_layer: Option<TargetLayer>,
    head: Option<ClassifierHead>,
}

impl OnnxClassifier {
    /// Loads the checkpoint bundle at `bundle_dir`.
    pub fn load(identifier: &str, bundle_dir: impl AsRef<Path>) -> CxrResult<Self> {
        let bundle_dir = bundle_dir.as_ref();
        let model_path = bundle_dir.join(MODEL_FILE);
        if !model_path.is_file() {
            return Err(CxrError::model_load(
                identifier,
                format!("model file not found at {}", model_path.display()),
            ));
        }

        let infer = OrtInfer::new(&model_path, Some(INPUT_NAME)).map_err(|e| {
            CxrError::model_load_with_source(identifier, "failed to create inference session", e)
        })?;

        let output_names = infer.output_names()?;
        if !output_names.iter().any(|n| n == SCORES_OUTPUT) {
            return Err(CxrError::model_load(
                identifier,
                format!("graph declares no '{SCORES_OUTPUT}' output"),
            ));
        }
        let target_layer = output_names
            .iter()
            .any(|n| n == FEATURES_OUTPUT)
            .then(|| TargetLayer::new(FEATURES_OUTPUT));

        let head = Self::load_head(identifier, &bundle_dir.join(HEAD_FILE))?;

        info!(
            identifier,
            target_layer = target_layer.is_some(),
            head = head.is_some(),
            "loaded classifier bundle"
        );

        Ok(Self {
            identifier: identifier.to_string(),
            labels: XRV_PATHOLOGIES.iter().map(|s| s.to_string()).collect(),
            infer,
            target_layer,
            head,
        })
    }

    fn load_head(identifier: &str, path: &Path) -> CxrResult<Option<ClassifierHead>> {
        if !path.is_file() {
            debug!(identifier, "no head weights in bundle, gradient CAMs disabled");
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let head: ClassifierHead = serde_json::from_str(&raw).map_err(|e| {
            CxrError::model_load_with_source(identifier, "malformed head.json", e)
        })?;
        Ok(Some(head))
    }

    /// Splits a forward pass into score and feature-map outputs.
    fn run(&self, input: &Tensor4D) -> CxrResult<(Vec<f32>, Option<TensorOutput>)> {
        validate_input_shape(input, self.input_side())?;
        let mut scores = None;
        let mut features = None;
        for (name, output) in self.infer.infer(input)? {
            match name.as_str() {
                SCORES_OUTPUT => scores = Some(output.try_into_scores()?),
                FEATURES_OUTPUT => features = Some(output),
                _ => {}
            }
        }
        let scores = scores.ok_or_else(|| {
            CxrError::model_load(&self.identifier, "forward pass produced no score output")
        })?;
        if scores.len() != self.labels.len() {
            return Err(CxrError::invalid_input(format!(
                "model '{}' produced {} scores for {} labels",
                self.identifier,
                scores.len(),
                self.labels.len()
            )));
        }
        Ok((scores, features))
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.identifier
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_side(&self) -> u32 {
        MODEL_INPUT_SIDE
    }

    fn target_layer(&self) -> Option<&TargetLayer> {
        self.target_layer.as_ref()
    }

    fn predict(&self, input: &Tensor4D) -> CxrResult<Vec<f32>> {
        let (scores, _) = self.run(input)?;
        Ok(scores)
    }

    fn forward_traced(&self, input: &Tensor4D) -> CxrResult<TracedForward> {
        let (scores, features) = self.run(input)?;
        let features = features.ok_or_else(|| CxrError::NoTargetLayer {
            model: self.identifier.clone(),
        })?;
        Ok(TracedForward {
            scores,
            activations: features.try_into_feature_map()?,
        })
    }

    fn class_gradients(&self, traced: &TracedForward, class_index: usize) -> CxrResult<Tensor3D> {
        let head = self.head.as_ref().ok_or_else(|| {
            CxrError::unsupported(format!(
                "model '{}' has no head weights; gradient-based attribution is unavailable",
                self.identifier
            ))
        })?;
        let probability = *traced.scores.get(class_index).ok_or_else(|| {
            CxrError::invalid_input(format!(
                "class index {} outside the {}-class score vector",
                class_index,
                traced.scores.len()
            ))
        })?;
        head.activation_gradient(class_index, probability, traced.activations.dim())
    }
}

/// Serves the exported torchxrayvision checkpoints from a models directory.
#[derive(Debug)]
pub struct XrvModelLibrary {
    models_dir: PathBuf,
    choices: Vec<String>,
}

impl XrvModelLibrary {
    /// Creates a library rooted at `models_dir`.
    ///
    /// The directory itself may be missing until a load is attempted, so a
    /// session can be configured before the weights are fetched.
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            choices: XRV_MODEL_CHOICES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Directory the checkpoint bundles are read from.
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }
}

impl ModelLibrary for XrvModelLibrary {
    fn source(&self) -> ModelSource {
        ModelSource::Xrv
    }

    fn choices(&self) -> &[String] {
        &self.choices
    }

    fn load(&self, identifier: &str) -> CxrResult<Arc<dyn Classifier>> {
        if !self.choices.iter().any(|c| c == identifier) {
            return Err(CxrError::model_load(
                identifier,
                "unknown model identifier",
            ));
        }
        let bundle_dir = self.models_dir.join(identifier);
        Ok(Arc::new(OnnxClassifier::load(identifier, bundle_dir)?))
    }
}
