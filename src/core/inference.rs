//! ONNX Runtime integration for classifier inference.
//!
//! [`OrtInfer`] owns one ONNX session and exposes a single inference entry
//! point that accepts a batched image tensor and returns every declared model
//! output. Interpreting those outputs (which one is the score vector, which
//! one is the target-layer feature map) is the model layer's job, not this
//! module's.

use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::{Tensor3D, Tensor4D};
use ort::logging::LogLevel;
use ort::session::{Session, SessionInputs, builder::SessionBuilder};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Loads a session with default logging configuration.
pub fn load_session(model_path: impl AsRef<Path>) -> CxrResult<Session> {
    load_session_with(model_path, |builder| {
        Ok(builder.with_log_level(LogLevel::Error)?)
    })
}

/// Builds a session using a caller-provided builder configuration.
pub(crate) fn load_session_with<F>(model_path: impl AsRef<Path>, configure_builder: F) -> CxrResult<Session>
where
    F: FnOnce(SessionBuilder) -> Result<SessionBuilder, ort::Error>,
{
    let path = model_path.as_ref();
    let builder = Session::builder()?;
    let mut builder = configure_builder(builder)?;
    #[cfg(feature = "cuda")]
    let mut builder = builder
        .with_execution_providers([ort::ep::CUDA::default().build()])
        .map_err(ort::Error::from)?;
    let session = builder.commit_from_file(path).map_err(|e| {
        CxrError::model_load_with_source(
            path.display().to_string(),
            "failed to create ONNX session; verify the model file exists and is readable",
            e,
        )
    })?;
    Ok(session)
}

/// A raw tensor produced by one forward pass.
///
/// Classification models in this crate emit only `f32` tensors, so the shape
/// is carried alongside a flat value buffer and converted on demand.
#[derive(Debug, Clone)]
pub struct TensorOutput {
    /// Declared dimensions of the output tensor.
    pub shape: Vec<i64>,
    /// Flattened row-major values.
    pub data: Vec<f32>,
}

impl TensorOutput {
    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Interprets the output as a `(1, N)` or `(N,)` score vector.
    pub fn try_into_scores(self) -> CxrResult<Vec<f32>> {
        let dims: Vec<usize> = self.shape.iter().map(|&d| d as usize).collect();
        let classes = match dims.as_slice() {
            [n] => *n,
            [1, n] => *n,
            other => {
                return Err(CxrError::invalid_input(format!(
                    "expected a score vector of shape (N,) or (1, N), got {:?}",
                    other
                )));
            }
        };
        if self.data.len() != classes {
            return Err(CxrError::invalid_input(format!(
                "score vector length mismatch: shape says {}, buffer holds {}",
                classes,
                self.data.len()
            )));
        }
        Ok(self.data)
    }

    /// Interprets the output as a `(1, C, H, W)` feature map, dropping the
    /// batch axis.
    pub fn try_into_feature_map(self) -> CxrResult<Tensor3D> {
        let dims: Vec<usize> = self.shape.iter().map(|&d| d as usize).collect();
        let (c, h, w) = match dims.as_slice() {
            [1, c, h, w] => (*c, *h, *w),
            [c, h, w] => (*c, *h, *w),
            other => {
                return Err(CxrError::invalid_input(format!(
                    "expected a feature map of shape (1, C, H, W), got {:?}",
                    other
                )));
            }
        };
        if self.data.len() != c * h * w {
            return Err(CxrError::invalid_input(format!(
                "feature map length mismatch: shape says {}, buffer holds {}",
                c * h * w,
                self.data.len()
            )));
        }
        Ok(Tensor3D::from_shape_vec((c, h, w), self.data)?)
    }
}

/// Inference engine wrapping one ONNX Runtime session.
pub struct OrtInfer {
    session: Mutex<Session>,
    input_name: String,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("input_name", &self.input_name)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Creates an inference engine for the model file at `model_path`.
    ///
    /// `input_name` defaults to `"x"`, the input name used by the exported
    /// chest X-ray classifiers.
    pub fn new(model_path: impl AsRef<Path>, input_name: Option<&str>) -> CxrResult<Self> {
        let path = model_path.as_ref();
        let session = load_session(path)?;
        let model_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown_model".to_string());

        Ok(OrtInfer {
            session: Mutex::new(session),
            input_name: input_name.unwrap_or("x").to_string(),
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Returns the model path associated with this inference engine.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Names of the declared graph outputs, in declaration order.
    pub fn output_names(&self) -> CxrResult<Vec<String>> {
        let session_guard = self.session.lock().map_err(|_| {
            CxrError::invalid_input(format!(
                "model '{}': failed to acquire session lock",
                self.model_name
            ))
        })?;
        Ok(session_guard
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect())
    }

    /// Runs one forward pass and returns all declared outputs in graph order.
    ///
    /// The input tensor must be contiguous; the pipeline always hands over
    /// freshly built `(1, 1, S, S)` batches, which are.
    pub fn infer(&self, batch: &Tensor4D) -> CxrResult<Vec<(String, TensorOutput)>> {
        let dims: Vec<i64> = batch.shape().iter().map(|&d| d as i64).collect();
        let data = batch.as_slice().ok_or_else(|| {
            CxrError::invalid_input("input tensor is not contiguous in memory")
        })?;
        let tensor_ref = TensorRef::from_array_view((dims, data)).map_err(|e| {
            CxrError::invalid_input(format!("failed to create input TensorRef: {}", e))
        })?;

        let mut session_guard = self.session.lock().map_err(|_| {
            CxrError::invalid_input(format!(
                "model '{}': failed to acquire session lock",
                self.model_name
            ))
        })?;

        // Collect declared output names before running.
        let output_names: Vec<String> = session_guard
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        let ort_inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(vec![(
            Cow::Borrowed(self.input_name.as_str()),
            tensor_ref.into(),
        )]);
        let outputs = session_guard.run(ort_inputs)?;

        let mut results = Vec::with_capacity(output_names.len());
        for name in &output_names {
            let value = &outputs[name.as_str()];
            let (shape, data) = value.try_extract_tensor::<f32>().map_err(|e| {
                CxrError::backend_with_source(
                    self.model_name.clone(),
                    0,
                    format!("output '{}' is not an f32 tensor", name),
                    e,
                )
            })?;
            results.push((
                name.clone(),
                TensorOutput {
                    shape: shape.to_vec(),
                    data: data.to_vec(),
                },
            ));
        }

        Ok(results)
    }
}
