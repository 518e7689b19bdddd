//! Error types for the diagnosis pipeline.
//!
//! All fallible operations in the crate return [`CxrError`], which separates
//! precondition failures (missing selections, invalid parameters) from backend
//! failures raised while a computation is underway. Helper constructors keep
//! error creation terse at call sites.

use thiserror::Error;

/// Convenient result alias used throughout the crate.
pub type CxrResult<T> = Result<T, CxrError>;

/// The error type shared by every stage of the pipeline.
#[derive(Error, Debug)]
pub enum CxrError {
    /// A required selection was absent when an operation needed it.
    ///
    /// Raised by the session before any expensive work starts, so the
    /// message names exactly which selection is missing.
    #[error("Missing input: {message}")]
    InputMissing {
        /// Which selection is missing and how to provide it.
        message: String,
    },

    /// Loading or initializing a classification model failed.
    #[error("Model load failed for '{identifier}': {message}")]
    ModelLoad {
        /// The model choice that was requested.
        identifier: String,
        /// What went wrong.
        message: String,
        /// Underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested candidate count cannot be satisfied by the score vector.
    #[error("Invalid candidate count: requested {k} of {classes} classes")]
    InvalidK {
        /// Requested number of candidates.
        k: usize,
        /// Number of classes actually available.
        classes: usize,
    },

    /// The classifier exposes no layer suitable for attribution.
    #[error("Classifier '{model}' exposes no attribution target layer")]
    NoTargetLayer {
        /// Name of the offending classifier.
        model: String,
    },

    /// The overlay blend weight fell outside the closed unit interval.
    #[error("Blend weight {alpha} is outside [0, 1]")]
    InvalidBlendWeight {
        /// The rejected weight.
        alpha: f32,
    },

    /// The input image carries no usable signal.
    #[error("Degenerate image: {message}")]
    DegenerateImage {
        /// Why the image was rejected.
        message: String,
    },

    /// An attribution backend failed while computing a map.
    #[error("CAM backend {method} failed for class {class_index}: {message}")]
    Backend {
        /// Name of the CAM method that failed.
        method: String,
        /// Class index the map was requested for.
        class_index: usize,
        /// What went wrong.
        message: String,
        /// Underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The classifier does not support the requested capability.
    #[error("Unsupported operation: {message}")]
    Unsupported {
        /// Which capability is missing.
        message: String,
    },

    /// Generic validation failure for malformed arguments.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Details about the invalid input.
        message: String,
    },

    /// The feedback recorder was driven through an illegal transition.
    #[error("Feedback recorder: {message}")]
    RecorderState {
        /// Which transition was rejected and why.
        message: String,
    },

    /// A feedback or image store operation failed.
    #[error("Store error: {message}")]
    Store {
        /// What the store was doing when it failed.
        message: String,
        /// Underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration loading or validation failed.
    #[error("Configuration error: {message}")]
    Config {
        /// Details about the configuration problem.
        message: String,
    },

    /// Decoding an image from bytes or disk failed.
    #[error("Image load error")]
    ImageLoad(#[source] image::ImageError),

    /// An ONNX Runtime session raised an error.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// A tensor reshape or view was dimensionally invalid.
    #[error("Tensor operation error")]
    Tensor(#[from] ndarray::ShapeError),

    /// An I/O operation failed.
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error")]
    Serde(#[from] serde_json::Error),
}

impl CxrError {
    /// Creates an `InputMissing` error naming the absent selection.
    pub fn input_missing(message: impl Into<String>) -> Self {
        Self::InputMissing {
            message: message.into(),
        }
    }

    /// Creates a `ModelLoad` error without an underlying source.
    pub fn model_load(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            identifier: identifier.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `ModelLoad` error wrapping an underlying source error.
    pub fn model_load_with_source<E>(
        identifier: impl Into<String>,
        message: impl Into<String>,
        source: E,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelLoad {
            identifier: identifier.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a `Backend` error without an underlying source.
    pub fn backend(
        method: impl Into<String>,
        class_index: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            method: method.into(),
            class_index,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `Backend` error wrapping an underlying source error.
    pub fn backend_with_source<E>(
        method: impl Into<String>,
        class_index: usize,
        message: impl Into<String>,
        source: E,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            method: method.into(),
            class_index,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an `Unsupported` error for a missing classifier capability.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates an `InvalidInput` error with the given message.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a `DegenerateImage` error with the given message.
    pub fn degenerate_image(message: impl Into<String>) -> Self {
        Self::DegenerateImage {
            message: message.into(),
        }
    }

    /// Creates a `RecorderState` error with the given message.
    pub fn recorder_state(message: impl Into<String>) -> Self {
        Self::RecorderState {
            message: message.into(),
        }
    }

    /// Creates a `Store` error without an underlying source.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `Store` error wrapping an underlying source error.
    pub fn store_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a `Config` error with the given message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Allows validation errors from the config layer to flow into `CxrError`.
impl From<crate::core::config::ConfigError> for CxrError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::Config {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_missing_selection() {
        let err = CxrError::input_missing("select an image first");
        assert_eq!(err.to_string(), "Missing input: select an image first");
    }

    #[test]
    fn invalid_k_reports_both_sides() {
        let err = CxrError::InvalidK { k: 7, classes: 5 };
        assert_eq!(
            err.to_string(),
            "Invalid candidate count: requested 7 of 5 classes"
        );
    }

    #[test]
    fn backend_error_carries_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = CxrError::backend_with_source("ScoreCAM", 3, "masked forward failed", inner);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("ScoreCAM"));
        assert!(err.to_string().contains("class 3"));
    }

    #[test]
    fn config_error_converts() {
        let config_err = crate::core::config::ConfigError::InvalidConfig {
            message: "bad".to_string(),
        };
        let err: CxrError = config_err.into();
        assert!(matches!(err, CxrError::Config { .. }));
    }
}
