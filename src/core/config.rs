//! Configuration validation primitives.
//!
//! Configuration structs implement [`ConfigValidator`] so that invalid
//! settings are rejected once, up front, instead of surfacing as confusing
//! failures deep inside a diagnosis run.

use std::path::Path;
use thiserror::Error;

/// Errors produced while validating configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Details about the invalid value.
        message: String,
    },

    /// A referenced model file or directory does not exist.
    #[error("Model path not found: {path}")]
    ModelPathNotFound {
        /// The missing path.
        path: String,
    },

    /// Cross-field validation failed.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Details about the failure.
        message: String,
    },
}

/// Implementation of `From<ConfigError>` for String.
///
/// Converts a ConfigError to a String by using its Display implementation.
impl From<ConfigError> for String {
    fn from(error: ConfigError) -> Self {
        error.to_string()
    }
}

/// Trait for validating configuration structs.
pub trait ConfigValidator {
    /// Validates the configuration, returning the first problem found.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Returns a configuration populated with default values.
    fn get_defaults() -> Self
    where
        Self: Sized;

    /// Validates that a float lies inside the closed unit interval.
    fn validate_unit_interval(&self, value: f32, name: &str) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&value) || !value.is_finite() {
            return Err(ConfigError::InvalidConfig {
                message: format!("{} must be within [0, 1], got {}", name, value),
            });
        }
        Ok(())
    }

    /// Validates that a count is strictly positive.
    fn validate_positive_usize(&self, value: usize, name: &str) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidConfig {
                message: format!("{} must be greater than zero", name),
            });
        }
        Ok(())
    }

    /// Validates that a model path exists on disk.
    fn validate_model_path(&self, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ModelPathNotFound {
                path: path.display().to_string(),
            });
        }
        Ok(())
    }
}
