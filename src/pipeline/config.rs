//! Session configuration: the tunable knobs of a diagnosis pipeline and a
//! loader for TOML or JSON config files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cam::CamMethod;
use crate::core::config::{ConfigError, ConfigValidator};
use crate::core::constants::{DEFAULT_BLEND_ALPHA, DEFAULT_NUM_RESULTS};
use crate::core::errors::{CxrError, CxrResult};
use crate::models::library::{ModelLibrary, ModelSource};
use crate::models::synthetic::SyntheticModelLibrary;
use crate::models::xrv::XrvModelLibrary;

/// Settings for one diagnosis session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of result slots per diagnosis.
    pub num_results: usize,
    /// Attribution method the session starts with.
    pub cam_method: CamMethod,
    /// Saliency weight of the overlay blend, in [0, 1].
    pub blend_alpha: f32,
    /// Which model family to serve.
    pub model_source: ModelSource,
    /// Model identifier to preselect, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_identifier: Option<String>,
    /// Directory holding ONNX checkpoint bundles.
    pub models_dir: PathBuf,
    /// Directory holding the labeled image catalogue.
    pub images_dir: PathBuf,
    /// JSONL file feedback submissions append to.
    pub feedback_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_results: DEFAULT_NUM_RESULTS,
            cam_method: CamMethod::GradCam,
            blend_alpha: DEFAULT_BLEND_ALPHA,
            model_source: ModelSource::Xrv,
            model_identifier: None,
            models_dir: PathBuf::from("models"),
            images_dir: PathBuf::from("images"),
            feedback_path: PathBuf::from("feedback.jsonl"),
        }
    }
}

impl SessionConfig {
    /// Builds the model library for the configured source.
    pub fn build_library(&self) -> Box<dyn ModelLibrary> {
        match self.model_source {
            ModelSource::Xrv => Box::new(XrvModelLibrary::new(self.models_dir.clone())),
            ModelSource::Synthetic => Box::new(SyntheticModelLibrary::new()),
        }
    }
}

impl ConfigValidator for SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_positive_usize(self.num_results, "num_results")?;
        self.validate_unit_interval(self.blend_alpha, "blend_alpha")?;
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Configuration file format.
#[derive(Debug, Clone, Copy)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detects the format from a file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Loads and saves [`SessionConfig`] files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads a config file, auto-detecting the format from the extension.
    ///
    /// The loaded configuration is validated before it is returned.
    pub fn load_from_file(path: &Path) -> CxrResult<SessionConfig> {
        let format = ConfigFormat::from_extension(path).ok_or_else(|| {
            CxrError::config(format!(
                "unsupported config file extension: {:?}",
                path.extension()
            ))
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            CxrError::config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::load_from_string(&content, format)
    }

    /// Loads a config from a string with the given format.
    pub fn load_from_string(content: &str, format: ConfigFormat) -> CxrResult<SessionConfig> {
        let config = match format {
            ConfigFormat::Toml => Self::load_from_toml(content)?,
            ConfigFormat::Json => Self::load_from_json(content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config string.
    pub fn load_from_toml(content: &str) -> CxrResult<SessionConfig> {
        toml::from_str(content)
            .map_err(|e| CxrError::config(format!("failed to parse TOML config: {e}")))
    }

    /// Parses a JSON config string.
    pub fn load_from_json(content: &str) -> CxrResult<SessionConfig> {
        serde_json::from_str(content)
            .map_err(|e| CxrError::config(format!("failed to parse JSON config: {e}")))
    }

    /// Saves a config file, auto-detecting the format from the extension.
    pub fn save_to_file(config: &SessionConfig, path: &Path) -> CxrResult<()> {
        let format = ConfigFormat::from_extension(path).ok_or_else(|| {
            CxrError::config(format!(
                "unsupported config file extension: {:?}",
                path.extension()
            ))
        })?;
        let content = Self::save_to_string(config, format)?;
        std::fs::write(path, content).map_err(|e| {
            CxrError::config(format!(
                "failed to write config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Serializes a config to a string with the given format.
    pub fn save_to_string(config: &SessionConfig, format: ConfigFormat) -> CxrResult<String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| CxrError::config(format!("failed to serialize TOML config: {e}"))),
            ConfigFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| CxrError::config(format!("failed to serialize JSON config: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_original_settings() {
        let config = SessionConfig::default();
        assert_eq!(config.num_results, 5);
        assert_eq!(config.cam_method, CamMethod::GradCam);
        assert!((config.blend_alpha - 0.7).abs() < 1e-6);
        assert_eq!(config.model_source, ModelSource::Xrv);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = SessionConfig {
            num_results: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.num_results = 5;
        config.blend_alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn format_detection_by_extension() {
        assert!(matches!(
            ConfigFormat::from_extension(Path::new("session.toml")),
            Some(ConfigFormat::Toml)
        ));
        assert!(matches!(
            ConfigFormat::from_extension(Path::new("session.json")),
            Some(ConfigFormat::Json)
        ));
        assert!(ConfigFormat::from_extension(Path::new("session.yaml")).is_none());
    }

    #[test]
    fn toml_round_trip_preserves_fields() {
        let config = SessionConfig {
            num_results: 3,
            cam_method: CamMethod::ScoreCam,
            model_source: ModelSource::Synthetic,
            ..Default::default()
        };
        let text = ConfigLoader::save_to_string(&config, ConfigFormat::Toml).unwrap();
        let back = ConfigLoader::load_from_string(&text, ConfigFormat::Toml).unwrap();
        assert_eq!(back.num_results, 3);
        assert_eq!(back.cam_method, CamMethod::ScoreCam);
        assert_eq!(back.model_source, ModelSource::Synthetic);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            ConfigLoader::load_from_json(r#"{"num_results": 2, "cam_method": "LayerCAM"}"#)
                .unwrap();
        assert_eq!(config.num_results, 2);
        assert_eq!(config.cam_method, CamMethod::LayerCam);
        assert!((config.blend_alpha - 0.7).abs() < 1e-6);
    }

    #[test]
    fn invalid_loaded_config_is_rejected() {
        let err = ConfigLoader::load_from_string(r#"{"blend_alpha": 2.0}"#, ConfigFormat::Json)
            .unwrap_err();
        assert!(matches!(err, CxrError::Config { .. }));
    }

    #[test]
    fn library_matches_the_source_tag() {
        let config = SessionConfig {
            model_source: ModelSource::Synthetic,
            ..Default::default()
        };
        assert_eq!(config.build_library().source(), ModelSource::Synthetic);
        let config = SessionConfig::default();
        assert_eq!(config.build_library().source(), ModelSource::Xrv);
    }
}
