//! Diagnosis outcome types.

use image::RgbImage;

use crate::cam::CamMethod;
use crate::core::tensor::Tensor2D;

/// One fully explained candidate pathology.
#[derive(Debug, Clone)]
pub struct CandidateResult {
    /// Result slot, 0-based; slot 0 holds the top-ranked class.
    pub slot: usize,
    /// Class index into the model's label list.
    pub class_index: usize,
    /// Pathology label.
    pub label: String,
    /// Probability as a percentage in [0, 100].
    pub probability: f32,
    /// Saliency in [0, 1] at model input resolution.
    pub saliency: Tensor2D,
    /// Saliency blended over the preprocessed image, ready for display.
    pub overlay: RgbImage,
}

impl CandidateResult {
    /// Probability formatted the way results are presented, e.g. `"12.34 %"`.
    pub fn probability_text(&self) -> String {
        format!("{:.2} %", self.probability)
    }
}

/// One result slot: a completed candidate or an isolated failure.
///
/// A failed slot keeps its rank, class and label so the remaining slots
/// stay aligned with the top-K selection that produced them.
#[derive(Debug, Clone)]
pub enum CandidateSlot {
    Completed(Box<CandidateResult>),
    Failed {
        slot: usize,
        class_index: usize,
        label: String,
        message: String,
    },
}

impl CandidateSlot {
    /// The slot's rank position.
    pub fn slot(&self) -> usize {
        match self {
            Self::Completed(result) => result.slot,
            Self::Failed { slot, .. } => *slot,
        }
    }

    /// The slot's pathology label.
    pub fn label(&self) -> &str {
        match self {
            Self::Completed(result) => &result.label,
            Self::Failed { label, .. } => label,
        }
    }

    /// The completed candidate, if the slot did not fail.
    pub fn as_completed(&self) -> Option<&CandidateResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// The outcome of one diagnose action.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    /// Identifier of the model that produced the candidates.
    pub model: String,
    /// Attribution method used.
    pub method: CamMethod,
    /// Exactly K slots, in rank order.
    pub slots: Vec<CandidateSlot>,
}

impl Diagnosis {
    /// Iterates the completed candidates in rank order.
    pub fn completed(&self) -> impl Iterator<Item = &CandidateResult> {
        self.slots.iter().filter_map(CandidateSlot::as_completed)
    }

    /// Number of slots that failed in isolation.
    pub fn failed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_failed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn completed(slot: usize) -> CandidateSlot {
        CandidateSlot::Completed(Box::new(CandidateResult {
            slot,
            class_index: slot + 10,
            label: format!("label-{slot}"),
            probability: 42.5,
            saliency: Array2::zeros((2, 2)),
            overlay: RgbImage::new(2, 2),
        }))
    }

    #[test]
    fn probability_renders_two_decimals() {
        let slot = completed(0);
        let result = slot.as_completed().unwrap();
        assert_eq!(result.probability_text(), "42.50 %");
    }

    #[test]
    fn diagnosis_separates_completed_from_failed() {
        let diagnosis = Diagnosis {
            model: "m".into(),
            method: CamMethod::GradCam,
            slots: vec![
                completed(0),
                CandidateSlot::Failed {
                    slot: 1,
                    class_index: 3,
                    label: "label-1".into(),
                    message: "backend failed".into(),
                },
            ],
        };
        assert_eq!(diagnosis.completed().count(), 1);
        assert_eq!(diagnosis.failed_count(), 1);
        assert_eq!(diagnosis.slots[1].slot(), 1);
        assert_eq!(diagnosis.slots[1].label(), "label-1");
        assert!(diagnosis.slots[1].as_completed().is_none());
    }
}
