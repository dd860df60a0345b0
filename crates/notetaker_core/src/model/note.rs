//! Note domain model.
//!
//! # Responsibility
//! - Define the canonical note record and its attached summary.
//! - Provide creation and summary lifecycle helpers.
//!
//! # Invariants
//! - `id` is unique for the lifetime of the collection.
//! - `text` is non-empty after trimming whitespace.
//! - `has_summary == summary.is_some()` after every mutation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque note identifier, `note_<uuid>` for notes created by this crate.
///
/// Kept as a string because ids written by older clients use other shapes.
pub type NoteId = String;

const NOTE_ID_PREFIX: &str = "note_";

/// Structured summary attached to one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub title: String,
    #[serde(default)]
    pub points: Vec<String>,
}

impl Summary {
    pub fn new(title: impl Into<String>, points: Vec<String>) -> Self {
        Self {
            title: title.into(),
            points,
        }
    }
}

/// One captured passage plus the provenance of the page it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub text: String,
    /// Page title at capture time.
    #[serde(default)]
    pub title: String,
    /// Page URL at capture time.
    #[serde(default)]
    pub url: String,
    /// Creation instant in Unix epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub has_summary: bool,
}

/// Validation failures for note records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    EmptyId,
    EmptyText,
    SummaryFlagMismatch(NoteId),
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "note id must not be empty"),
            Self::EmptyText => write!(f, "note text must not be empty"),
            Self::SummaryFlagMismatch(id) => {
                write!(f, "note {id}: hasSummary disagrees with summary presence")
            }
        }
    }
}

impl Error for NoteValidationError {}

impl Note {
    /// Creates a note with a fresh id and the current timestamp.
    pub fn new(
        text: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::with_id(
            new_note_id(),
            text,
            title,
            url,
            Utc::now().timestamp_millis(),
        )
    }

    /// Creates a note with caller-provided identity, used by import paths and tests.
    pub fn with_id(
        id: impl Into<NoteId>,
        text: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            title: title.into(),
            url: url.into(),
            timestamp,
            summary: None,
            has_summary: false,
        }
    }

    /// Validates record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.id.trim().is_empty() {
            return Err(NoteValidationError::EmptyId);
        }
        if self.text.trim().is_empty() {
            return Err(NoteValidationError::EmptyText);
        }
        if self.has_summary != self.summary.is_some() {
            return Err(NoteValidationError::SummaryFlagMismatch(self.id.clone()));
        }
        Ok(())
    }

    /// Sets the summary and keeps `has_summary` in step.
    pub fn attach_summary(&mut self, summary: Summary) {
        self.summary = Some(summary);
        self.has_summary = true;
    }

    /// Re-derives `has_summary` from `summary`.
    ///
    /// Returns `true` when the stored flag was stale.
    pub fn normalize(&mut self) -> bool {
        let expected = self.summary.is_some();
        let repaired = self.has_summary != expected;
        self.has_summary = expected;
        repaired
    }
}

/// Generates a new opaque note id.
pub fn new_note_id() -> NoteId {
    format!("{NOTE_ID_PREFIX}{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::{new_note_id, Note, NoteValidationError, Summary};

    #[test]
    fn new_note_starts_without_summary() {
        let note = Note::new("Alpha insight", "Page A", "http://a");
        assert!(note.id.starts_with("note_"));
        assert!(!note.has_summary);
        assert!(note.summary.is_none());
        assert!(note.validate().is_ok());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(new_note_id(), new_note_id());
    }

    #[test]
    fn validate_rejects_blank_text() {
        let note = Note::with_id("note_1", "   ", "t", "u", 1);
        assert_eq!(note.validate(), Err(NoteValidationError::EmptyText));
    }

    #[test]
    fn normalize_repairs_stale_flag() {
        let mut note = Note::with_id("note_1", "text", "t", "u", 1);
        note.has_summary = true;
        assert!(note.validate().is_err());
        assert!(note.normalize());
        assert!(!note.has_summary);

        note.attach_summary(Summary::new("S", vec!["p1".to_string()]));
        assert!(!note.normalize());
        assert!(note.has_summary);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let note = Note::with_id("note_1", "text", "Page", "http://a", 42);
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["hasSummary"], false);
        assert_eq!(value["timestamp"], 42);
        assert!(value.get("summary").is_none());
    }
}
