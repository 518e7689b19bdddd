//! Core building blocks of the diagnosis pipeline.
//!
//! This module contains the pieces every other module leans on:
//! - Error handling ([`CxrError`], [`CxrResult`])
//! - Configuration validation ([`ConfigValidator`])
//! - Shared constants
//! - ONNX Runtime inference ([`OrtInfer`])
//! - Tensor aliases used at the model boundary

pub mod config;
pub mod constants;
pub mod errors;
pub mod inference;
pub mod tensor;

pub use config::{ConfigError, ConfigValidator};
pub use constants::*;
pub use errors::{CxrError, CxrResult};
pub use inference::{OrtInfer, TensorOutput, load_session};
pub use tensor::{Tensor2D, Tensor3D, Tensor4D};

/// Initializes the tracing subscriber for logging.
///
/// Sets up the tracing subscriber with an environment filter and a formatting
/// layer. Typically called once at the start of an application.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
