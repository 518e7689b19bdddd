//! Classifier backends and the libraries that serve them.

pub mod classifier;
pub mod library;
pub mod synthetic;
pub mod xrv;

pub use classifier::{Classifier, ClassifierHead, ModelState, TargetLayer, TracedForward};
pub use library::{ModelLibrary, ModelSource};
pub use synthetic::{SyntheticClassifier, SyntheticModelLibrary, SYNTHETIC_MODEL_CHOICES};
pub use xrv::{OnnxClassifier, XrvModelLibrary, XRV_MODEL_CHOICES, XRV_PATHOLOGIES};
