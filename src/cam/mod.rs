//! Class activation mapping: the method registry, extraction backends and
//! the orchestrator that drives them.

pub mod extractor;
pub mod gradcam;
pub mod orchestrator;
pub mod scorecam;

pub use extractor::{fuse_cams, AttributionContext, CamExtractor};
pub use orchestrator::{AttributionOrchestrator, Explanation};

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::CxrError;

/// The supported attribution methods, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CamMethod {
    #[default]
    #[serde(rename = "GradCAM")]
    GradCam,
    #[serde(rename = "GradCAMpp")]
    GradCamPp,
    #[serde(rename = "SmoothGradCAMpp")]
    SmoothGradCamPp,
    #[serde(rename = "ScoreCAM")]
    ScoreCam,
    #[serde(rename = "SSCAM")]
    SsCam,
    #[serde(rename = "ISCAM")]
    IsCam,
    #[serde(rename = "XGradCAM")]
    XGradCam,
    #[serde(rename = "LayerCAM")]
    LayerCam,
}

/// Every method, in the order they are offered to a user.
pub const CAM_METHOD_CHOICES: [CamMethod; 8] = [
    CamMethod::GradCam,
    CamMethod::GradCamPp,
    CamMethod::SmoothGradCamPp,
    CamMethod::ScoreCam,
    CamMethod::SsCam,
    CamMethod::IsCam,
    CamMethod::XGradCam,
    CamMethod::LayerCam,
];

impl CamMethod {
    /// Canonical method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GradCam => "GradCAM",
            Self::GradCamPp => "GradCAMpp",
            Self::SmoothGradCamPp => "SmoothGradCAMpp",
            Self::ScoreCam => "ScoreCAM",
            Self::SsCam => "SSCAM",
            Self::IsCam => "ISCAM",
            Self::XGradCam => "XGradCAM",
            Self::LayerCam => "LayerCAM",
        }
    }

    /// Whether the method needs the gradient capability on the classifier.
    pub fn needs_gradients(&self) -> bool {
        matches!(
            self,
            Self::GradCam
                | Self::GradCamPp
                | Self::SmoothGradCamPp
                | Self::XGradCam
                | Self::LayerCam
        )
    }

    /// Instantiates the backend for this method with its default settings.
    pub fn build(&self) -> Box<dyn CamExtractor> {
        match self {
            Self::GradCam => Box::new(gradcam::GradCam),
            Self::GradCamPp => Box::new(gradcam::GradCamPp),
            Self::SmoothGradCamPp => Box::new(gradcam::SmoothGradCamPp::default()),
            Self::ScoreCam => Box::new(scorecam::ScoreCam),
            Self::SsCam => Box::new(scorecam::SsCam::default()),
            Self::IsCam => Box::new(scorecam::IsCam::default()),
            Self::XGradCam => Box::new(gradcam::XGradCam),
            Self::LayerCam => Box::new(gradcam::LayerCam),
        }
    }
}

impl std::fmt::Display for CamMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CamMethod {
    type Err = CxrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "Grad-CAM++" and "gradcampp" both resolve; '+' must map to 'p'
        // before separators are dropped or GradCAM++ collides with GradCAM.
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .replace("++", "pp")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "gradcam" => Ok(Self::GradCam),
            "gradcampp" => Ok(Self::GradCamPp),
            "smoothgradcampp" => Ok(Self::SmoothGradCamPp),
            "scorecam" => Ok(Self::ScoreCam),
            "sscam" => Ok(Self::SsCam),
            "iscam" => Ok(Self::IsCam),
            "xgradcam" => Ok(Self::XGradCam),
            "layercam" => Ok(Self::LayerCam),
            _ => Err(CxrError::invalid_input(format!(
                "unknown CAM method '{s}', expected one of: {}",
                CAM_METHOD_CHOICES
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_method_round_trips_through_display() {
        for method in CAM_METHOD_CHOICES {
            assert_eq!(CamMethod::from_str(method.as_str()).unwrap(), method);
        }
    }

    #[test]
    fn parsing_tolerates_decorations() {
        assert_eq!(CamMethod::from_str("grad-cam++").unwrap(), CamMethod::GradCamPp);
        assert_eq!(CamMethod::from_str(" layer_cam ").unwrap(), CamMethod::LayerCam);
        assert_eq!(CamMethod::from_str("GRADCAM").unwrap(), CamMethod::GradCam);
        assert!(CamMethod::from_str("eigencam").is_err());
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&CamMethod::SmoothGradCamPp).unwrap();
        assert_eq!(json, "\"SmoothGradCAMpp\"");
        let back: CamMethod = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CamMethod::SmoothGradCamPp);
    }

    #[test]
    fn gradient_requirement_splits_the_families() {
        assert!(CamMethod::GradCam.needs_gradients());
        assert!(!CamMethod::ScoreCam.needs_gradients());
        assert!(!CamMethod::SsCam.needs_gradients());
        assert!(!CamMethod::IsCam.needs_gradients());
    }

    #[test]
    fn every_method_builds_its_backend() {
        for method in CAM_METHOD_CHOICES {
            assert_eq!(method.build().name(), method.as_str());
        }
    }
}
