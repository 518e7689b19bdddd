//! Session orchestration: configuration and the interactive diagnosis
//! session that ties preprocessing, classification, attribution, overlay
//! rendering and feedback together.

pub mod config;
pub mod session;

pub use config::{ConfigFormat, ConfigLoader, SessionConfig};
pub use session::DiagnosisSession;
