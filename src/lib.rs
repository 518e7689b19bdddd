//! # CXR CAM
//!
//! A Rust library for interactive chest X-ray diagnosis with class activation
//! maps. It classifies a radiograph with an ONNX model, picks the most likely
//! pathologies and renders a saliency overlay per candidate so a reader can
//! see what the model looked at.
//!
//! ## Features
//!
//! - Complete diagnosis pipeline from image to annotated overlays
//! - Eight CAM methods across the gradient and score families
//! - Model library abstraction for swapping classifier backends
//! - Torchxrayvision-style preprocessing (luma, windowing, center crop)
//! - Per-candidate feedback collection with JSONL persistence
//! - ONNX Runtime integration for fast inference
//!
//! ## Components
//!
//! - **Preprocessing**: Grayscale conversion, `[-1024, 1024]` windowing and
//!   center-cropped resizing to the model input side
//! - **Classification**: Multi-label pathology scores from an ONNX model, or
//!   a deterministic synthetic model for weight-free runs
//! - **Attribution**: GradCAM, GradCAM++, SmoothGradCAM++, XGradCAM,
//!   LayerCAM, ScoreCAM, SSCAM and ISCAM over the classifier's last
//!   convolutional feature map
//! - **Rendering**: Jet-colormapped saliency blended over the X-ray, with
//!   optional burned-in labels
//! - **Feedback**: One confirm flag and one free-text comment per result
//!   slot, serialized in slot order
//!
//! ## Modules
//!
//! * [`core`] - Error handling, constants, tensor aliases, ONNX inference
//! * [`domain`] - Candidate results, diagnoses and feedback records
//! * [`models`] - Classifier trait, model libraries and backends
//! * [`cam`] - Attribution methods and the orchestrator that drives them
//! * [`pipeline`] - Session configuration and the interactive session
//! * [`processors`] - Image preprocessing and top-K selection
//! * [`stores`] - Image catalogues and feedback persistence
//! * [`utils`] - Image, tensor and visualization helpers
//!
//! ## Quick Start
//!
//! ### Interactive Diagnosis Session
//!
//! ```rust,no_run
//! use cxr_cam::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // The synthetic library runs without model weights.
//! let config = SessionConfig {
//!     model_source: ModelSource::Synthetic,
//!     ..SessionConfig::default()
//! };
//! let mut session = DiagnosisSession::new(config)?;
//!
//! session.select_image("chest.png", load_image(Path::new("studies/chest.png"))?);
//! session.select_model("synthetic-cxr-lite")?;
//! session.select_method(CamMethod::GradCamPp);
//!
//! let diagnosis = session.diagnose()?;
//! for result in diagnosis.completed() {
//!     println!("{}: {}", result.label, result.probability_text());
//!     result.overlay.save(format!("overlay_{}.png", result.slot))?;
//! }
//!
//! // Record what the reader thought of each result slot.
//! session.set_feedback_confirmed(0, true)?;
//! session.set_feedback_comment(1, Some("borderline opacity".into()))?;
//! let mut store = JsonlFeedbackStore::new("feedback.jsonl");
//! session.submit_feedback(&mut store)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### TOML Configuration
//!
//! ```rust,no_run
//! use cxr_cam::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Unspecified fields keep their defaults.
//! let config = ConfigLoader::load_from_toml(r#"
//!     num_results = 3
//!     cam_method = "ScoreCAM"
//!     blend_alpha = 0.6
//!     model_source = "xrv"
//!     models_dir = "models"
//!     images_dir = "images"
//! "#)?;
//!
//! let catalogue = DirectoryImageStore::open(&config.images_dir)?;
//! let mut session = DiagnosisSession::new(config)?;
//! session.select_image_from_store(&catalogue, "patient_0012.png")?;
//! session.select_model("densenet121-res224-all")?;
//! session.select_method(session.config().cam_method);
//! session.diagnose()?;
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod cam;
pub mod core;
pub mod domain;
pub mod models;

pub mod pipeline;
pub mod processors;
pub mod stores;
pub mod utils;

pub use crate::core::init_tracing;

/// Prelude module for convenient imports.
///
/// Bring the essentials into scope with a single use statement:
///
/// ```rust
/// use cxr_cam::prelude::*;
/// ```
///
/// Included items focus on the most common tasks:
/// - The session and its configuration (`DiagnosisSession`, `SessionConfig`,
///   `ConfigLoader`)
/// - Attribution method selection (`CamMethod`, `CAM_METHOD_CHOICES`)
/// - Diagnosis results (`Diagnosis`, `CandidateResult`, `CandidateSlot`)
/// - Feedback persistence (`FeedbackRecord`, `JsonlFeedbackStore`)
/// - Essential error and result types (`CxrError`, `CxrResult`)
/// - Basic image loading (`load_image`, `DirectoryImageStore`)
///
/// For advanced customization (classifier backends, extractor traits,
/// low-level tensor helpers), import directly from the respective modules
/// (e.g., `cxr_cam::models`, `cxr_cam::cam`, `cxr_cam::utils`).
pub mod prelude {
    // Session (essential)
    pub use crate::pipeline::{ConfigLoader, DiagnosisSession, SessionConfig};

    // Attribution methods
    pub use crate::cam::{CAM_METHOD_CHOICES, CamMethod};

    // Results and feedback
    pub use crate::domain::{CandidateResult, CandidateSlot, Diagnosis, FeedbackRecord};

    // Model selection
    pub use crate::models::ModelSource;

    // Stores
    pub use crate::stores::{DirectoryImageStore, FeedbackStore, ImageStore, JsonlFeedbackStore};

    // Error Handling (essential)
    pub use crate::core::{CxrError, CxrResult};

    // Image Utility (minimal)
    pub use crate::utils::load_image;
}
