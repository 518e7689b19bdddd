//! Drives one attribution backend against one classifier.

use std::sync::Arc;

use tracing::debug;

use crate::cam::extractor::{fuse_cams, AttributionContext, CamExtractor};
use crate::cam::CamMethod;
use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::{Tensor2D, Tensor4D};
use crate::models::classifier::Classifier;
use crate::utils::tensor::{normalize_unit, resize_bilinear};

/// The outcome of explaining one candidate class.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Score vector from this candidate's own forward pass.
    pub scores: Vec<f32>,
    /// Saliency normalized to [0, 1] at model input resolution.
    pub saliency: Tensor2D,
}

/// Resolves a method once and explains candidates with it.
pub struct AttributionOrchestrator {
    classifier: Arc<dyn Classifier>,
    extractor: Box<dyn CamExtractor>,
    method: CamMethod,
}

impl std::fmt::Debug for AttributionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionOrchestrator")
            .field("classifier", &self.classifier.name())
            .field("method", &self.method)
            .finish()
    }
}

impl AttributionOrchestrator {
    /// Resolves `method` against `classifier`.
    ///
    /// Models without a designated target layer cannot be attributed at
    /// all; that is rejected here, before any forward pass runs.
    pub fn new(classifier: Arc<dyn Classifier>, method: CamMethod) -> CxrResult<Self> {
        Self::from_parts(classifier, method.build(), method)
    }

    pub(crate) fn from_parts(
        classifier: Arc<dyn Classifier>,
        extractor: Box<dyn CamExtractor>,
        method: CamMethod,
    ) -> CxrResult<Self> {
        match classifier.target_layer() {
            Some(layer) => {
                debug!(
                    model = classifier.name(),
                    target_layer = %layer,
                    method = %method,
                    "resolved attribution backend"
                );
            }
            None => {
                return Err(CxrError::NoTargetLayer {
                    model: classifier.name().to_string(),
                });
            }
        }
        Ok(Self {
            classifier,
            extractor,
            method,
        })
    }

    /// The resolved method.
    pub fn method(&self) -> CamMethod {
        self.method
    }

    /// The classifier being explained.
    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    /// Explains one class of one input.
    ///
    /// Runs a fresh traced forward pass, extracts the raw maps, fuses
    /// them, then upsamples and normalizes to input resolution. The
    /// returned scores come from that same pass.
    pub fn explain(&self, input: &Tensor4D, class_index: usize) -> CxrResult<Explanation> {
        let traced = self.classifier.forward_traced(input)?;
        let ctx = AttributionContext {
            classifier: self.classifier.as_ref(),
            input,
            traced: &traced,
        };

        let raw = self
            .extractor
            .extract(&ctx, class_index)
            .map_err(|e| match e {
                e @ CxrError::NoTargetLayer { .. } => e,
                e => CxrError::backend_with_source(
                    self.extractor.name(),
                    class_index,
                    "map extraction failed",
                    e,
                ),
            })?;
        if raw.is_empty() {
            return Err(CxrError::backend(
                self.extractor.name(),
                class_index,
                "backend produced no maps",
            ));
        }
        debug!(
            method = self.extractor.name(),
            class_index,
            maps = raw.len(),
            "fusing raw maps"
        );

        let fused = fuse_cams(raw)?;
        let (_, _, h, w) = input.dim();
        let saliency = normalize_unit(&resize_bilinear(&fused, h, w));
        Ok(Explanation {
            scores: traced.scores,
            saliency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::Tensor4D;
    use crate::models::classifier::Classifier;
    use crate::models::synthetic::SyntheticClassifier;
    use ndarray::{array, Array4};

    fn input_for(model: &SyntheticClassifier) -> Tensor4D {
        let side = model.input_side() as usize;
        Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            ((y * side + x) as f32 / (side * side) as f32) * 2048.0 - 1024.0
        })
    }

    #[test]
    fn missing_target_layer_fails_at_construction() {
        let model = Arc::new(SyntheticClassifier::tiny().unwrap().without_target_layer());
        let err = AttributionOrchestrator::new(model, CamMethod::GradCam).unwrap_err();
        assert!(matches!(err, CxrError::NoTargetLayer { .. }));
    }

    #[test]
    fn explain_returns_input_sized_unit_saliency() {
        let model = Arc::new(SyntheticClassifier::tiny().unwrap());
        let input = input_for(model.as_ref());
        let orchestrator = AttributionOrchestrator::new(model, CamMethod::GradCam).unwrap();
        let explanation = orchestrator.explain(&input, 0).unwrap();
        assert_eq!(explanation.saliency.dim(), (64, 64));
        assert_eq!(explanation.scores.len(), 6);
        assert!(explanation
            .saliency
            .iter()
            .all(|&v| (0.0..=1.0).contains(&v)));
    }

    struct ScriptedExtractor {
        maps: Vec<Tensor2D>,
    }

    impl CamExtractor for ScriptedExtractor {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn extract(
            &self,
            _ctx: &AttributionContext<'_>,
            _class_index: usize,
        ) -> CxrResult<Vec<Tensor2D>> {
            Ok(self.maps.clone())
        }
    }

    #[test]
    fn multiple_maps_are_fused_before_upsampling() {
        let model = Arc::new(SyntheticClassifier::tiny().unwrap());
        let input = input_for(model.as_ref());
        let scripted = ScriptedExtractor {
            maps: vec![array![[0.0f32, 1.0], [0.0, 1.0]], array![[0.5f32]]],
        };
        let orchestrator = AttributionOrchestrator::from_parts(
            model,
            Box::new(scripted),
            CamMethod::LayerCam,
        )
        .unwrap();
        let explanation = orchestrator.explain(&input, 0).unwrap();
        assert_eq!(explanation.saliency.dim(), (64, 64));
        let max = explanation.saliency.iter().cloned().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_backend_output_is_a_backend_error() {
        let model = Arc::new(SyntheticClassifier::tiny().unwrap());
        let input = input_for(model.as_ref());
        let orchestrator = AttributionOrchestrator::from_parts(
            model,
            Box::new(ScriptedExtractor { maps: Vec::new() }),
            CamMethod::ScoreCam,
        )
        .unwrap();
        let err = orchestrator.explain(&input, 0).unwrap_err();
        assert!(matches!(err, CxrError::Backend { .. }));
    }

    #[test]
    fn out_of_range_class_is_wrapped_with_backend_context() {
        let model = Arc::new(SyntheticClassifier::tiny().unwrap());
        let input = input_for(model.as_ref());
        let orchestrator = AttributionOrchestrator::new(model, CamMethod::GradCam).unwrap();
        let err = orchestrator.explain(&input, 99).unwrap_err();
        match err {
            CxrError::Backend { class_index, .. } => assert_eq!(class_index, 99),
            other => panic!("expected Backend, got {other:?}"),
        }
    }
}
