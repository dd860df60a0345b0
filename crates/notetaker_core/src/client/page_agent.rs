//! Per-page capture agent.

use super::{accepted, ClientError};
use crate::coordinator::CoordinatorHandle;
use crate::model::note::{Note, NoteValidationError};
use crate::protocol::Request;
use log::debug;

/// Selections at or below this many characters get no capture affordance.
pub const CAPTURE_MIN_CHARS: usize = 10;

/// Provenance of the page the agent runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub title: String,
    pub url: String,
}

impl PageContext {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Captures highlighted passages from one page.
pub struct PageAgent {
    coordinator: CoordinatorHandle,
    page: PageContext,
}

impl PageAgent {
    pub fn new(coordinator: CoordinatorHandle, page: PageContext) -> Self {
        Self { coordinator, page }
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// Whether the in-page "add to notes" affordance should be shown.
    pub fn offers_capture(selection: &str) -> bool {
        selection.trim().chars().count() > CAPTURE_MIN_CHARS
    }

    /// Saves the trimmed selection as a new note.
    ///
    /// # Errors
    /// - `Validation` for a blank selection; no request is sent.
    /// - `Rejected` when the coordinator refuses the note.
    pub async fn capture(&self, selection: &str) -> Result<Note, ClientError> {
        let text = selection.trim();
        if text.is_empty() {
            return Err(ClientError::Validation(NoteValidationError::EmptyText));
        }

        let response = accepted(
            self.coordinator
                .request(Request::add_note(
                    text,
                    self.page.title.as_str(),
                    self.page.url.as_str(),
                ))
                .await,
        )?;
        let note = response.new_note.ok_or(ClientError::MissingField("newNote"))?;
        debug!(
            "event=capture module=page_agent status=ok note_id={}",
            note.id
        );
        Ok(note)
    }

    /// Fetches the current collection.
    pub async fn notes(&self) -> Result<Vec<Note>, ClientError> {
        accepted(self.coordinator.request(Request::GetNotes).await)?
            .notes
            .ok_or(ClientError::MissingField("notes"))
    }
}
