//! Structured reader feedback on diagnosis results.
//!
//! After a diagnosis the reader confirms or rejects each result slot and
//! may leave a free-text comment. The recorder is a small state machine:
//! it is Empty until a cycle begins, Collecting while entries are edited,
//! and submission finalizes the entries into an ordered [`FeedbackRecord`]
//! and resets to Empty. The number of slots is fixed at construction.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::errors::{CxrError, CxrResult};

/// Feedback on one result slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackEntry {
    /// Whether the reader confirmed the finding.
    pub confirmed: bool,
    /// Optional free-text comment.
    pub comment: Option<String>,
}

/// A finalized, ordered feedback submission.
///
/// Holds exactly two fields per result slot, `result{i}_confirm` then
/// `result{i}_comment`, in slot order. Field order is part of the record's
/// contract, so it serializes as an ordered map rather than a struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    fields: Vec<(String, String)>,
}

impl FeedbackRecord {
    /// Builds the record for a finished cycle.
    ///
    /// Booleans render as `"true"` / `"false"`; an absent comment renders
    /// as the empty string.
    pub fn from_entries(entries: &[FeedbackEntry]) -> Self {
        let mut fields = Vec::with_capacity(entries.len() * 2);
        for (slot, entry) in entries.iter().enumerate() {
            fields.push((
                format!("result{slot}_confirm"),
                if entry.confirmed { "true" } else { "false" }.to_string(),
            ));
            fields.push((
                format!("result{slot}_comment"),
                entry.comment.clone().unwrap_or_default(),
            ));
        }
        Self { fields }
    }

    /// The fields in submission order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Looks a field up by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for FeedbackRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FeedbackRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = FeedbackRecord;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a map of feedback fields")
            }

            fn visit_map<V>(self, mut map: V) -> Result<FeedbackRecord, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, String>()? {
                    fields.push((key, value));
                }
                Ok(FeedbackRecord { fields })
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// Collects per-slot feedback between a diagnosis and its submission.
#[derive(Debug, Clone, Default)]
pub struct FeedbackRecorder {
    num_results: usize,
    entries: Option<Vec<FeedbackEntry>>,
}

impl FeedbackRecorder {
    /// Creates a recorder for `num_results` slots.
    pub fn new(num_results: usize) -> CxrResult<Self> {
        if num_results == 0 {
            return Err(CxrError::invalid_input(
                "a feedback recorder needs at least one result slot",
            ));
        }
        Ok(Self {
            num_results,
            entries: None,
        })
    }

    /// Number of slots per cycle.
    pub fn num_results(&self) -> usize {
        self.num_results
    }

    /// Whether a cycle is in progress.
    pub fn is_collecting(&self) -> bool {
        self.entries.is_some()
    }

    /// Starts a fresh cycle with default entries.
    ///
    /// A cycle already in progress is discarded wholesale, mirroring how a
    /// new diagnosis replaces the previous results.
    pub fn begin_cycle(&mut self) {
        self.entries = Some(vec![FeedbackEntry::default(); self.num_results]);
    }

    /// Clears any in-progress cycle without submitting.
    pub fn reset(&mut self) {
        self.entries = None;
    }

    /// The entries of the current cycle.
    pub fn entries(&self) -> CxrResult<&[FeedbackEntry]> {
        self.entries
            .as_deref()
            .ok_or_else(|| CxrError::recorder_state("no feedback cycle in progress"))
    }

    fn entry_mut(&mut self, slot: usize) -> CxrResult<&mut FeedbackEntry> {
        let num_results = self.num_results;
        let entries = self
            .entries
            .as_mut()
            .ok_or_else(|| CxrError::recorder_state("no feedback cycle in progress"))?;
        entries.get_mut(slot).ok_or_else(|| {
            CxrError::invalid_input(format!(
                "result slot {slot} outside the {num_results}-slot cycle"
            ))
        })
    }

    /// Sets the confirmation flag for one slot.
    pub fn set_confirmed(&mut self, slot: usize, confirmed: bool) -> CxrResult<()> {
        self.entry_mut(slot)?.confirmed = confirmed;
        Ok(())
    }

    /// Sets or clears the comment for one slot.
    pub fn set_comment(&mut self, slot: usize, comment: Option<String>) -> CxrResult<()> {
        self.entry_mut(slot)?.comment = comment;
        Ok(())
    }

    /// Finalizes the cycle into a record and resets to Empty.
    pub fn submit(&mut self) -> CxrResult<FeedbackRecord> {
        let entries = self
            .entries
            .take()
            .ok_or_else(|| CxrError::recorder_state("nothing to submit; no feedback cycle in progress"))?;
        Ok(FeedbackRecord::from_entries(&entries))
    }
}
