//! Labeled image catalogues.
//!
//! An [`ImageStore`] answers four questions: which labels exist, which
//! filenames carry a label, what the canonical label of a filename is, and
//! what bytes a filename holds. [`DirectoryImageStore`] implements it over
//! a plain directory with a `metadata.csv` of `filename,label` lines, the
//! local stand-in for a remote study archive.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::info;

use crate::core::errors::{CxrError, CxrResult};
use crate::utils::image::decode_image;

const METADATA_FILE: &str = "metadata.csv";

/// A catalogue of labeled chest X-ray images.
pub trait ImageStore: Send + Sync {
    /// Unique labels in first-appearance order.
    fn labels(&self) -> CxrResult<Vec<String>>;

    /// Filenames carrying the given label, in catalogue order.
    fn filenames(&self, label: &str) -> CxrResult<Vec<String>>;

    /// Canonical label of one filename.
    fn label_for(&self, filename: &str) -> CxrResult<String>;

    /// Raw encoded bytes of one image.
    fn fetch(&self, filename: &str) -> CxrResult<Vec<u8>>;

    /// Fetches and decodes one image to RGB.
    fn load_rgb(&self, filename: &str) -> CxrResult<RgbImage> {
        let bytes = self.fetch(filename)?;
        decode_image(&bytes)
    }
}

/// An [`ImageStore`] over a directory and its `metadata.csv`.
#[derive(Debug, Clone)]
pub struct DirectoryImageStore {
    root: PathBuf,
    entries: Vec<(String, String)>,
}

impl DirectoryImageStore {
    /// Opens the catalogue rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> CxrResult<Self> {
        let root = root.into();
        let metadata_path = root.join(METADATA_FILE);
        let raw = fs::read_to_string(&metadata_path).map_err(|e| {
            CxrError::store_with_source(
                format!("failed to read {}", metadata_path.display()),
                e,
            )
        })?;
        let entries = parse_metadata(&raw)?;
        info!(
            root = %root.display(),
            images = entries.len(),
            "opened image catalogue"
        );
        Ok(Self { root, entries })
    }

    /// The catalogue's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, filename: &str) -> CxrResult<&(String, String)> {
        self.entries
            .iter()
            .find(|(name, _)| name == filename)
            .ok_or_else(|| {
                CxrError::store(format!("'{filename}' is not in the catalogue"))
            })
    }
}

/// Parses `filename,label` lines, tolerating a header row.
fn parse_metadata(raw: &str) -> CxrResult<Vec<(String, String)>> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (filename, label) = line.split_once(',').ok_or_else(|| {
            CxrError::store(format!(
                "metadata line {} is not 'filename,label': '{line}'",
                number + 1
            ))
        })?;
        let filename = filename.trim();
        let label = label.trim();
        if number == 0 && filename.eq_ignore_ascii_case("filename") {
            continue;
        }
        if filename.is_empty() || label.is_empty() {
            return Err(CxrError::store(format!(
                "metadata line {} has an empty filename or label",
                number + 1
            )));
        }
        if entries.iter().any(|(name, _)| name == filename) {
            return Err(CxrError::store(format!(
                "duplicate filename '{filename}' in metadata"
            )));
        }
        entries.push((filename.to_string(), label.to_string()));
    }
    Ok(entries)
}

impl ImageStore for DirectoryImageStore {
    fn labels(&self) -> CxrResult<Vec<String>> {
        let mut labels: Vec<String> = Vec::new();
        for (_, label) in &self.entries {
            if !labels.iter().any(|l| l == label) {
                labels.push(label.clone());
            }
        }
        Ok(labels)
    }

    fn filenames(&self, label: &str) -> CxrResult<Vec<String>> {
        let matches: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, l)| l == label)
            .map(|(name, _)| name.clone())
            .collect();
        if matches.is_empty() {
            return Err(CxrError::store(format!(
                "no images carry the label '{label}'"
            )));
        }
        Ok(matches)
    }

    fn label_for(&self, filename: &str) -> CxrResult<String> {
        Ok(self.entry(filename)?.1.clone())
    }

    fn fetch(&self, filename: &str) -> CxrResult<Vec<u8>> {
        self.entry(filename)?;
        let path = self.root.join(filename);
        fs::read(&path).map_err(|e| {
            CxrError::store_with_source(format!("failed to read {}", path.display()), e)
        })
    }
}
