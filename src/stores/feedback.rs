//! Feedback persistence.
//!
//! Submissions are append-only; [`JsonlFeedbackStore`] writes one JSON
//! object per line with field order preserved, so a stored line reads in
//! the same slot order it was submitted in. [`MemoryFeedbackStore`] backs
//! tests and demos that should not touch the filesystem.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::errors::{CxrError, CxrResult};
use crate::domain::feedback::FeedbackRecord;

/// Append-only persistence for feedback submissions.
pub trait FeedbackStore: Send + Sync {
    /// Appends one record.
    fn append(&mut self, record: &FeedbackRecord) -> CxrResult<()>;

    /// Reads every stored record, oldest first.
    fn read_all(&self) -> CxrResult<Vec<FeedbackRecord>>;
}

/// A [`FeedbackStore`] writing one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlFeedbackStore {
    path: PathBuf,
}

impl JsonlFeedbackStore {
    /// Creates a store that appends to `path`.
    ///
    /// The file is created on first append; reading a missing file yields
    /// an empty history.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeedbackStore for JsonlFeedbackStore {
    fn append(&mut self, record: &FeedbackRecord) -> CxrResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                CxrError::store_with_source(
                    format!("failed to open {}", self.path.display()),
                    e,
                )
            })?;
        writeln!(file, "{line}")?;
        info!(path = %self.path.display(), fields = record.len(), "appended feedback record");
        Ok(())
    }

    fn read_all(&self) -> CxrResult<Vec<FeedbackRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: FeedbackRecord = serde_json::from_str(line).map_err(|e| {
                CxrError::store_with_source(
                    format!(
                        "malformed feedback record on line {} of {}",
                        number + 1,
                        self.path.display()
                    ),
                    e,
                )
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

/// An in-memory [`FeedbackStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryFeedbackStore {
    records: Vec<FeedbackRecord>,
}

impl MemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeedbackStore for MemoryFeedbackStore {
    fn append(&mut self, record: &FeedbackRecord) -> CxrResult<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> CxrResult<Vec<FeedbackRecord>> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feedback::FeedbackRecorder;

    fn sample_record(confirmed: bool) -> FeedbackRecord {
        let mut recorder = FeedbackRecorder::new(2).unwrap();
        recorder.begin_cycle();
        recorder.set_confirmed(0, confirmed).unwrap();
        recorder.submit().unwrap()
    }

    #[test]
    fn jsonl_appends_and_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlFeedbackStore::new(dir.path().join("feedback.jsonl"));

        store.append(&sample_record(true)).unwrap();
        store.append(&sample_record(false)).unwrap();

        let records = store.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("result0_confirm"), Some("true"));
        assert_eq!(records[1].get("result0_confirm"), Some("false"));
    }

    #[test]
    fn stored_lines_preserve_field_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let mut store = JsonlFeedbackStore::new(&path);
        store.append(&sample_record(false)).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with(r#"{"result0_confirm""#));
    }

    #[test]
    fn missing_file_reads_as_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlFeedbackStore::new(dir.path().join("absent.jsonl"));
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn malformed_line_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        fs::write(&path, "not json\n").unwrap();
        let store = JsonlFeedbackStore::new(&path);
        assert!(matches!(
            store.read_all().unwrap_err(),
            CxrError::Store { .. }
        ));
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryFeedbackStore::new();
        store.append(&sample_record(true)).unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
    }
}
