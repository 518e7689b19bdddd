//! Image preprocessing and score post-processing.

pub mod preprocess;
pub mod topk;

pub use preprocess::XrayPreprocessor;
pub use topk::select_topk;
