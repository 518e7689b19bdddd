//! Persistence collaborators: image catalogues and feedback stores.

pub mod feedback;
pub mod images;

pub use feedback::{FeedbackStore, JsonlFeedbackStore, MemoryFeedbackStore};
pub use images::{DirectoryImageStore, ImageStore};
