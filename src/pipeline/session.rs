//! The interactive diagnosis session.
//!
//! A [`DiagnosisSession`] owns the mutable state one user works with: the
//! selected image, the loaded classifier, the chosen attribution method,
//! the latest diagnosis and the feedback recorder. One session drives one
//! sequential diagnose action at a time; every action either completes or
//! fails terminally, leaving prior state intact.

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::cam::{AttributionOrchestrator, CamMethod};
use crate::core::config::ConfigValidator;
use crate::core::errors::{CxrError, CxrResult};
use crate::domain::candidate::{CandidateResult, CandidateSlot, Diagnosis};
use crate::domain::feedback::{FeedbackEntry, FeedbackRecord, FeedbackRecorder};
use crate::models::classifier::{Classifier, ModelState};
use crate::models::library::ModelLibrary;
use crate::pipeline::config::SessionConfig;
use crate::processors::preprocess::XrayPreprocessor;
use crate::processors::topk::select_topk;
use crate::stores::feedback::FeedbackStore;
use crate::stores::images::ImageStore;
use crate::utils::tensor::plane_to_batch;
use crate::utils::visualization::overlay_mask;

struct SelectedImage {
    name: String,
    rgb: RgbImage,
}

/// Session state for one interactive user.
pub struct DiagnosisSession {
    config: SessionConfig,
    library: Box<dyn ModelLibrary>,
    recorder: FeedbackRecorder,
    image: Option<SelectedImage>,
    classifier: Option<Arc<dyn Classifier>>,
    model_identifier: Option<String>,
    model_state: ModelState,
    method: Option<CamMethod>,
    diagnosis: Option<Diagnosis>,
}

impl std::fmt::Debug for DiagnosisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisSession")
            .field("image", &self.image.as_ref().map(|i| i.name.as_str()))
            .field("model", &self.classifier.as_ref().map(|c| c.name()))
            .field("model_state", &self.model_state)
            .field("method", &self.method)
            .field("has_diagnosis", &self.diagnosis.is_some())
            .finish()
    }
}

impl DiagnosisSession {
    /// Creates a session over the library the config names.
    pub fn new(config: SessionConfig) -> CxrResult<Self> {
        let library = config.build_library();
        Self::with_library(config, library)
    }

    /// Creates a session over an explicit model library.
    pub fn with_library(
        config: SessionConfig,
        library: Box<dyn ModelLibrary>,
    ) -> CxrResult<Self> {
        config.validate()?;
        let recorder = FeedbackRecorder::new(config.num_results)?;
        info!(
            source = %library.source(),
            num_results = config.num_results,
            "diagnosis session ready"
        );
        Ok(Self {
            config,
            library,
            recorder,
            image: None,
            classifier: None,
            model_identifier: None,
            model_state: ModelState::NotLoaded,
            method: None,
            diagnosis: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The library models are selected from.
    pub fn library(&self) -> &dyn ModelLibrary {
        self.library.as_ref()
    }

    /// Load state of the classifier slot.
    pub fn model_state(&self) -> ModelState {
        self.model_state
    }

    /// Identifier the loaded classifier was selected under, if any.
    pub fn selected_model(&self) -> Option<&str> {
        self.model_identifier.as_deref()
    }

    /// The selected attribution method, if any.
    pub fn selected_method(&self) -> Option<CamMethod> {
        self.method
    }

    /// Name of the selected image, if any.
    pub fn selected_image(&self) -> Option<&str> {
        self.image.as_ref().map(|i| i.name.as_str())
    }

    /// The latest completed diagnosis, if any.
    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        self.diagnosis.as_ref()
    }

    /// Selects an image, wholesale replacing the previous selection.
    ///
    /// Any previous diagnosis and in-progress feedback cycle are dropped;
    /// they refer to the replaced image.
    pub fn select_image(&mut self, name: impl Into<String>, rgb: RgbImage) {
        let name = name.into();
        debug!(image = %name, width = rgb.width(), height = rgb.height(), "image selected");
        self.image = Some(SelectedImage { name, rgb });
        self.diagnosis = None;
        self.recorder.reset();
    }

    /// Fetches an image from a store and selects it.
    pub fn select_image_from_store(
        &mut self,
        store: &dyn ImageStore,
        filename: &str,
    ) -> CxrResult<()> {
        let rgb = store.load_rgb(filename)?;
        self.select_image(filename, rgb);
        Ok(())
    }

    /// Loads and selects a classifier by identifier.
    ///
    /// Re-selecting the already loaded identifier is a no-op. Selecting a
    /// different identifier drops the previous diagnosis and feedback
    /// cycle. A failed load leaves the previously loaded model in place.
    pub fn select_model(&mut self, identifier: &str) -> CxrResult<()> {
        if self.model_identifier.as_deref() == Some(identifier)
            && self.model_state == ModelState::Ready
        {
            debug!(identifier, "model already loaded, keeping it");
            return Ok(());
        }

        self.model_state = ModelState::Loading;
        match self.library.load(identifier) {
            Ok(classifier) => {
                info!(identifier, classes = classifier.labels().len(), "model selected");
                self.classifier = Some(classifier);
                self.model_identifier = Some(identifier.to_string());
                self.model_state = ModelState::Ready;
                self.diagnosis = None;
                self.recorder.reset();
                Ok(())
            }
            Err(e) => {
                self.model_state = if self.classifier.is_some() {
                    ModelState::Ready
                } else {
                    ModelState::NotLoaded
                };
                Err(e)
            }
        }
    }

    /// Selects the attribution method for subsequent diagnoses.
    ///
    /// A previously computed diagnosis stays visible until re-run.
    pub fn select_method(&mut self, method: CamMethod) {
        debug!(method = %method, "attribution method selected");
        self.method = Some(method);
    }

    /// Runs one full diagnose action.
    ///
    /// Preconditions (image, model, method, K against the label count, a
    /// target layer for attribution) are checked before any forward pass.
    /// Each result slot is computed with its own traced forward pass;
    /// per-slot backend failures are isolated into failed slots, while
    /// precondition errors abort the whole action with prior state intact.
    pub fn diagnose(&mut self) -> CxrResult<&Diagnosis> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| CxrError::input_missing("select an image first"))?;
        let classifier = self
            .classifier
            .clone()
            .ok_or_else(|| CxrError::input_missing("select a classification model first"))?;
        let method = self
            .method
            .ok_or_else(|| CxrError::input_missing("select a CAM method first"))?;

        let k = self.config.num_results;
        let classes = classifier.labels().len();
        if k == 0 || k > classes {
            return Err(CxrError::InvalidK { k, classes });
        }

        // NoTargetLayer surfaces here, before any forward pass.
        let orchestrator = AttributionOrchestrator::new(classifier.clone(), method)?;

        info!(
            image = %image.name,
            model = classifier.name(),
            method = %method,
            k,
            "diagnose started"
        );

        let preprocessor = XrayPreprocessor::new(classifier.input_side());
        let (transformed, rescaled) = preprocessor.preprocess(&image.rgb)?;
        let input = plane_to_batch(&rescaled);

        let ranking = classifier.predict(&input)?;
        let top = select_topk(&ranking, k)?;

        let mut slots = Vec::with_capacity(k);
        for (slot, &class_index) in top.iter().enumerate() {
            let label = classifier.labels()[class_index].clone();
            let outcome = orchestrator.explain(&input, class_index).and_then(|expl| {
                let probability = expl
                    .scores
                    .get(class_index)
                    .copied()
                    .ok_or_else(|| {
                        CxrError::invalid_input(format!(
                            "class index {class_index} outside the candidate score vector"
                        ))
                    })?
                    * 100.0;
                let overlay = overlay_mask(&transformed, &expl.saliency, self.config.blend_alpha)?;
                Ok(CandidateResult {
                    slot,
                    class_index,
                    label: label.clone(),
                    probability,
                    saliency: expl.saliency,
                    overlay,
                })
            });
            match outcome {
                Ok(result) => {
                    debug!(slot, label = %result.label, probability = result.probability, "candidate explained");
                    slots.push(CandidateSlot::Completed(Box::new(result)));
                }
                Err(e) => {
                    warn!(slot, label = %label, error = %e, "candidate failed, slot isolated");
                    slots.push(CandidateSlot::Failed {
                        slot,
                        class_index,
                        label,
                        message: e.to_string(),
                    });
                }
            }
        }

        let diagnosis = Diagnosis {
            model: classifier.name().to_string(),
            method,
            slots,
        };
        info!(
            completed = diagnosis.completed().count(),
            failed = diagnosis.failed_count(),
            "diagnose finished"
        );

        self.recorder.begin_cycle();
        Ok(&*self.diagnosis.insert(diagnosis))
    }

    /// The feedback entries of the current cycle.
    pub fn feedback_entries(&self) -> CxrResult<&[FeedbackEntry]> {
        self.recorder.entries()
    }

    /// Sets the confirmation flag for one result slot.
    pub fn set_feedback_confirmed(&mut self, slot: usize, confirmed: bool) -> CxrResult<()> {
        self.recorder.set_confirmed(slot, confirmed)
    }

    /// Sets or clears the comment for one result slot.
    pub fn set_feedback_comment(&mut self, slot: usize, comment: Option<String>) -> CxrResult<()> {
        self.recorder.set_comment(slot, comment)
    }

    /// Finalizes the feedback cycle and appends it to the store.
    pub fn submit_feedback(&mut self, store: &mut dyn FeedbackStore) -> CxrResult<FeedbackRecord> {
        let record = self.recorder.submit()?;
        store.append(&record)?;
        info!(fields = record.len(), "feedback submitted");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::{Tensor3D, Tensor4D};
    use crate::models::classifier::{TargetLayer, TracedForward};
    use crate::models::library::ModelSource;
    use crate::models::synthetic::SyntheticClassifier;
    use crate::stores::feedback::MemoryFeedbackStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn synthetic_config() -> SessionConfig {
        SessionConfig {
            model_source: ModelSource::Synthetic,
            ..Default::default()
        }
    }

    fn gradient_image() -> RgbImage {
        RgbImage::from_fn(80, 60, |x, y| {
            let v = ((x * 3 + y * 2) % 256) as u8;
            image::Rgb([v, v, v])
        })
    }

    #[test]
    fn preconditions_fire_in_order() {
        let mut session = DiagnosisSession::new(synthetic_config()).unwrap();

        let err = session.diagnose().unwrap_err();
        assert!(err.to_string().contains("select an image"));

        session.select_image("study.png", gradient_image());
        let err = session.diagnose().unwrap_err();
        assert!(err.to_string().contains("select a classification model"));

        session.select_model("synthetic-cxr-tiny").unwrap();
        let err = session.diagnose().unwrap_err();
        assert!(err.to_string().contains("select a CAM method"));
    }

    #[test]
    fn full_diagnose_fills_every_slot() {
        let mut session = DiagnosisSession::new(synthetic_config()).unwrap();
        session.select_image("study.png", gradient_image());
        session.select_model("synthetic-cxr-tiny").unwrap();
        session.select_method(CamMethod::GradCam);

        let diagnosis = session.diagnose().unwrap();
        assert_eq!(diagnosis.slots.len(), 5);
        assert_eq!(diagnosis.completed().count(), 5);
        for (i, slot) in diagnosis.slots.iter().enumerate() {
            let result = slot.as_completed().unwrap();
            assert_eq!(result.slot, i);
            assert!((0.0..=100.0).contains(&result.probability));
            assert_eq!(result.saliency.dim(), (64, 64));
            assert_eq!(result.overlay.dimensions(), (64, 64));
        }

        // Ranking comes from the initial pass; the slots must carry five
        // distinct classes.
        let mut indices: Vec<usize> = diagnosis
            .completed()
            .map(|r| r.class_index)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 5);

        // The diagnosis opened a feedback cycle with one entry per slot.
        assert_eq!(session.feedback_entries().unwrap().len(), 5);
    }

    #[test]
    fn feedback_round_trips_through_the_store() {
        let mut session = DiagnosisSession::new(synthetic_config()).unwrap();
        session.select_image("study.png", gradient_image());
        session.select_model("synthetic-cxr-tiny").unwrap();
        session.select_method(CamMethod::GradCam);
        session.diagnose().unwrap();

        session.set_feedback_confirmed(0, true).unwrap();
        session
            .set_feedback_comment(2, Some("questionable margin".into()))
            .unwrap();

        let mut store = MemoryFeedbackStore::new();
        let record = session.submit_feedback(&mut store).unwrap();
        assert_eq!(record.len(), 10);
        assert_eq!(record.get("result0_confirm"), Some("true"));
        assert_eq!(record.get("result2_comment"), Some("questionable margin"));
        assert_eq!(record.get("result4_confirm"), Some("false"));

        let stored = store.read_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], record);

        // The cycle reset; a second submission needs a new diagnosis.
        assert!(session.submit_feedback(&mut store).is_err());
    }

    #[test]
    fn oversized_k_fails_before_any_forward_pass() {
        let config = SessionConfig {
            num_results: 7,
            ..synthetic_config()
        };
        let mut session = DiagnosisSession::new(config).unwrap();
        session.select_image("study.png", gradient_image());
        session.select_model("synthetic-cxr-tiny").unwrap();
        session.select_method(CamMethod::GradCam);

        match session.diagnose().unwrap_err() {
            CxrError::InvalidK { k, classes } => {
                assert_eq!(k, 7);
                assert_eq!(classes, 6);
            }
            other => panic!("expected InvalidK, got {other:?}"),
        }
        assert!(session.diagnosis().is_none());
    }

    struct CountingLibrary {
        loads: Arc<AtomicUsize>,
    }

    impl ModelLibrary for CountingLibrary {
        fn source(&self) -> ModelSource {
            ModelSource::Synthetic
        }

        fn choices(&self) -> &[String] {
            &[]
        }

        fn load(&self, identifier: &str) -> CxrResult<Arc<dyn Classifier>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match identifier {
                "tiny" => Ok(Arc::new(SyntheticClassifier::tiny()?)),
                other => Err(CxrError::model_load(other, "unknown model identifier")),
            }
        }
    }

    #[test]
    fn reselecting_the_loaded_model_does_not_reload() {
        let loads = Arc::new(AtomicUsize::new(0));
        let library = Box::new(CountingLibrary {
            loads: loads.clone(),
        });
        let mut session = DiagnosisSession::with_library(synthetic_config(), library).unwrap();

        session.select_model("tiny").unwrap();
        assert_eq!(session.model_state(), ModelState::Ready);
        assert_eq!(session.selected_model(), Some("tiny"));
        session.select_model("tiny").unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_keeps_the_previous_model() {
        let library = Box::new(CountingLibrary {
            loads: Arc::new(AtomicUsize::new(0)),
        });
        let mut session = DiagnosisSession::with_library(synthetic_config(), library).unwrap();

        assert!(session.select_model("missing").is_err());
        assert_eq!(session.model_state(), ModelState::NotLoaded);
        assert!(session.selected_model().is_none());

        session.select_model("tiny").unwrap();
        assert!(session.select_model("missing").is_err());
        assert_eq!(session.model_state(), ModelState::Ready);
        assert_eq!(session.selected_model(), Some("tiny"));
    }

    struct NoLayerLibrary;

    impl ModelLibrary for NoLayerLibrary {
        fn source(&self) -> ModelSource {
            ModelSource::Synthetic
        }

        fn choices(&self) -> &[String] {
            &[]
        }

        fn load(&self, _identifier: &str) -> CxrResult<Arc<dyn Classifier>> {
            Ok(Arc::new(
                SyntheticClassifier::tiny()?.without_target_layer(),
            ))
        }
    }

    #[test]
    fn missing_target_layer_aborts_the_whole_action() {
        let mut session =
            DiagnosisSession::with_library(synthetic_config(), Box::new(NoLayerLibrary)).unwrap();
        session.select_image("study.png", gradient_image());
        session.select_model("any").unwrap();
        session.select_method(CamMethod::GradCam);

        let err = session.diagnose().unwrap_err();
        assert!(matches!(err, CxrError::NoTargetLayer { .. }));
        assert!(session.diagnosis().is_none());
        assert!(session.feedback_entries().is_err());
    }

    /// Delegates to a synthetic model but fails gradients for odd classes.
    struct FlakyGradients {
        inner: SyntheticClassifier,
    }

    impl Classifier for FlakyGradients {
        fn name(&self) -> &str {
            "flaky"
        }

        fn labels(&self) -> &[String] {
            self.inner.labels()
        }

        fn input_side(&self) -> u32 {
            self.inner.input_side()
        }

        fn target_layer(&self) -> Option<&TargetLayer> {
            self.inner.target_layer()
        }

        fn predict(&self, input: &Tensor4D) -> CxrResult<Vec<f32>> {
            self.inner.predict(input)
        }

        fn forward_traced(&self, input: &Tensor4D) -> CxrResult<TracedForward> {
            self.inner.forward_traced(input)
        }

        fn class_gradients(
            &self,
            traced: &TracedForward,
            class_index: usize,
        ) -> CxrResult<Tensor3D> {
            if class_index % 2 == 1 {
                return Err(CxrError::unsupported("gradients unavailable"));
            }
            self.inner.class_gradients(traced, class_index)
        }
    }

    struct FlakyLibrary;

    impl ModelLibrary for FlakyLibrary {
        fn source(&self) -> ModelSource {
            ModelSource::Synthetic
        }

        fn choices(&self) -> &[String] {
            &[]
        }

        fn load(&self, _identifier: &str) -> CxrResult<Arc<dyn Classifier>> {
            Ok(Arc::new(FlakyGradients {
                inner: SyntheticClassifier::tiny()?,
            }))
        }
    }

    #[test]
    fn per_slot_failures_are_isolated() {
        let mut session =
            DiagnosisSession::with_library(synthetic_config(), Box::new(FlakyLibrary)).unwrap();
        session.select_image("study.png", gradient_image());
        session.select_model("any").unwrap();
        session.select_method(CamMethod::GradCam);

        let diagnosis = session.diagnose().unwrap();
        assert_eq!(diagnosis.slots.len(), 5);
        assert!(diagnosis.failed_count() >= 1);
        assert!(diagnosis.completed().count() >= 1);
        assert_eq!(
            diagnosis.failed_count() + diagnosis.completed().count(),
            5
        );
        // Failed slots keep their rank and label.
        for slot in &diagnosis.slots {
            assert!(!slot.label().is_empty());
        }
        // The feedback cycle still covers every slot.
        assert_eq!(session.feedback_entries().unwrap().len(), 5);
    }

    #[test]
    fn selecting_a_new_image_drops_results_and_feedback() {
        let mut session = DiagnosisSession::new(synthetic_config()).unwrap();
        session.select_image("first.png", gradient_image());
        session.select_model("synthetic-cxr-tiny").unwrap();
        session.select_method(CamMethod::GradCam);
        session.diagnose().unwrap();
        assert!(session.diagnosis().is_some());

        session.select_image("second.png", gradient_image());
        assert!(session.diagnosis().is_none());
        assert!(session.feedback_entries().is_err());
        assert_eq!(session.selected_image(), Some("second.png"));
    }
}
