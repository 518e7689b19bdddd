//! Model discovery behind a library abstraction.
//!
//! A [`ModelLibrary`] enumerates the classifiers one source can provide and
//! loads them by identifier. The session only ever talks to this trait, so
//! swapping the ONNX-backed library for the synthetic one (or a future
//! source) does not touch the pipeline.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::{CxrError, CxrResult};
use crate::models::classifier::Classifier;

/// Which family of models a library serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// Exported torchxrayvision DenseNet checkpoints, ONNX-backed.
    #[default]
    Xrv,
    /// Deterministic in-process models, weight-free.
    Synthetic,
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xrv => f.write_str("xrv"),
            Self::Synthetic => f.write_str("synthetic"),
        }
    }
}

impl FromStr for ModelSource {
    type Err = CxrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xrv" => Ok(Self::Xrv),
            "synthetic" => Ok(Self::Synthetic),
            other => Err(CxrError::invalid_input(format!(
                "unknown model source '{other}', expected 'xrv' or 'synthetic'"
            ))),
        }
    }
}

/// A catalogue of loadable classifiers.
pub trait ModelLibrary: Send + Sync {
    /// The source family this library serves.
    fn source(&self) -> ModelSource;

    /// Identifiers of every model the library can load, in display order.
    fn choices(&self) -> &[String];

    /// Loads the classifier with the given identifier.
    ///
    /// Unknown identifiers fail with `CxrError::ModelLoad`; the library
    /// stays usable afterwards.
    fn load(&self, identifier: &str) -> CxrResult<Arc<dyn Classifier>>;
}
