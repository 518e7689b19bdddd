//! Domain types shared across the pipeline: candidates, diagnoses and
//! reader feedback.

pub mod candidate;
pub mod feedback;

pub use candidate::{CandidateResult, CandidateSlot, Diagnosis};
pub use feedback::{FeedbackEntry, FeedbackRecord, FeedbackRecorder};
