//! Request/response and broadcast message contract between contexts.
//!
//! # Responsibility
//! - Define the `action`-tagged requests accepted by the coordinator.
//! - Define the flat response envelope and the `notesUpdated` notification.
//!
//! # Invariants
//! - Every request receives exactly one `Response`.
//! - Failures are carried in `error`, never by leaving a request unanswered.

use crate::model::note::{Note, NoteId};
use serde::{Deserialize, Serialize};

/// The summarizer rejected the credential; the cached key has been dropped.
pub const ERR_INVALID_API_KEY: &str = "INVALID_API_KEY";
pub const ERR_API_KEY_REQUIRED: &str = "API key required";
pub const ERR_NOTE_NOT_FOUND: &str = "Note not found";
pub const ERR_NO_NOTES: &str = "No notes to summarize";
/// The coordinator is gone or stopped before answering.
pub const ERR_UNAVAILABLE: &str = "coordinator unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddNotePayload {
    pub text: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRef {
    pub note_id: NoteId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummaryPayload {
    /// Text to summarize; composed from the stored notes when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes_text: Option<String>,
    /// Credential to use and cache; the cached one is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    #[serde(default)]
    pub format: String,
}

/// Request sent by a page agent or panel to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum Request {
    AddNote(AddNotePayload),
    GenerateSummary(NoteRef),
    GenerateOverallSummary(OverallSummaryPayload),
    DeleteNote(NoteRef),
    ClearAllNotes,
    GetNotes,
    ExportNotes(ExportPayload),
}

impl Request {
    pub fn add_note(
        text: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::AddNote(AddNotePayload {
            text: text.into(),
            url: url.into(),
            title: title.into(),
        })
    }

    pub fn generate_summary(note_id: impl Into<NoteId>) -> Self {
        Self::GenerateSummary(NoteRef {
            note_id: note_id.into(),
        })
    }

    pub fn delete_note(note_id: impl Into<NoteId>) -> Self {
        Self::DeleteNote(NoteRef {
            note_id: note_id.into(),
        })
    }

    pub fn export_notes(format: impl Into<String>) -> Self {
        Self::ExportNotes(ExportPayload {
            format: format.into(),
        })
    }

    /// Wire name of the action, used in logs.
    pub fn action(&self) -> &'static str {
        match self {
            Self::AddNote(_) => "addNote",
            Self::GenerateSummary(_) => "generateSummary",
            Self::GenerateOverallSummary(_) => "generateOverallSummary",
            Self::DeleteNote(_) => "deleteNote",
            Self::ClearAllNotes => "clearAllNotes",
            Self::GetNotes => "getNotes",
            Self::ExportNotes(_) => "exportNotes",
        }
    }
}

/// Flat response envelope; fields are populated per action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_note: Option<Note>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_note: Option<Note>,
    /// Free-form overall summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Rendered export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn with_notes(notes: Vec<Note>) -> Self {
        Self {
            success: true,
            notes: Some(notes),
            ..Self::default()
        }
    }

    pub fn created(note: Note, notes: Vec<Note>) -> Self {
        Self {
            new_note: Some(note),
            ..Self::with_notes(notes)
        }
    }

    pub fn updated(note: Note, notes: Vec<Note>) -> Self {
        Self {
            updated_note: Some(note),
            ..Self::with_notes(notes)
        }
    }

    pub fn overall_summary(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    pub fn exported(data: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Returns the error string of a failed response.
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.error.as_deref().unwrap_or("unknown error"))
        }
    }
}

/// Fire-and-forget broadcast published after each successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum Notification {
    NotesUpdated(Vec<Note>),
}
