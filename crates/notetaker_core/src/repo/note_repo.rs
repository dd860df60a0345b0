//! Note repository over a `PersistentStore`.
//!
//! # Responsibility
//! - Provide create/delete/clear/attach-summary mutations on the collection.
//! - Render exports and manage the cached summarizer credential.
//!
//! # Invariants
//! - Collection order is insertion order, newest first; nothing reorders it.
//! - Note ids stay unique for the lifetime of the collection.
//! - A missing `notes` key reads as the empty collection.
//! - A failed write leaves the previously stored collection untouched.

use crate::export::{self, ExportFormat};
use crate::model::note::{new_note_id, Note, NoteId, NoteValidationError, Summary};
use crate::store::{PersistentStore, StoreError};
use chrono::Utc;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store key holding the note collection.
pub const NOTES_KEY: &str = "notes";
/// Store key holding the cached summarizer credential.
pub const CREDENTIAL_KEY: &str = "geminiApiKey";

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Validation(NoteValidationError),
    NotFound(NoteId),
    Storage(StoreError),
    /// Persisted value could not be decoded.
    InvalidData(String),
    Serialization(serde_json::Error),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted note data: {message}"),
            Self::Serialization(err) => write!(f, "failed to encode notes: {err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<NoteValidationError> for RepoError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Storage(value)
    }
}

/// Outcome of a mutation that targets one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteChange {
    /// The created or updated note.
    pub note: Note,
    /// Full collection after the mutation.
    pub notes: Vec<Note>,
}

/// Single-writer repository over the note collection.
///
/// Callers must not share one repository between concurrent writers; the
/// coordinator owns exactly one instance.
pub struct NoteRepository<S: PersistentStore> {
    store: S,
}

impl<S: PersistentStore> NoteRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a snapshot of the collection, newest first.
    pub fn list(&self) -> RepoResult<Vec<Note>> {
        let Some(raw) = self.store.get(NOTES_KEY)? else {
            return Ok(Vec::new());
        };
        let mut notes: Vec<Note> = serde_json::from_str(&raw)
            .map_err(|err| RepoError::InvalidData(format!("`{NOTES_KEY}`: {err}")))?;
        let repaired = notes
            .iter_mut()
            .map(Note::normalize)
            .filter(|repaired| *repaired)
            .count();
        if repaired > 0 {
            warn!("event=notes_load module=repo status=repaired has_summary_flags={repaired}");
        }
        Ok(notes)
    }

    /// Returns one note by id.
    pub fn get(&self, id: &str) -> RepoResult<Option<Note>> {
        Ok(self.list()?.into_iter().find(|note| note.id == id))
    }

    /// Captures a new note and prepends it to the collection.
    ///
    /// # Errors
    /// - `Validation` when `text` is blank; nothing is written.
    pub fn create(&self, text: &str, title: &str, url: &str) -> RepoResult<NoteChange> {
        let mut note = Note::new(text, title, url);
        note.validate()?;

        let mut notes = self.list()?;
        while notes.iter().any(|existing| existing.id == note.id) {
            note.id = new_note_id();
        }
        notes.insert(0, note.clone());
        self.write_notes(&notes)?;

        info!(
            "event=note_create module=repo status=ok note_id={} text_chars={} total={}",
            note.id,
            note.text.chars().count(),
            notes.len()
        );
        Ok(NoteChange { note, notes })
    }

    /// Removes the note with `id`; an absent id is a no-op.
    pub fn delete(&self, id: &str) -> RepoResult<Vec<Note>> {
        let mut notes = self.list()?;
        let before = notes.len();
        notes.retain(|note| note.id != id);
        self.write_notes(&notes)?;

        info!(
            "event=note_delete module=repo status=ok note_id={id} removed={} total={}",
            before != notes.len(),
            notes.len()
        );
        Ok(notes)
    }

    /// Empties the collection.
    pub fn clear_all(&self) -> RepoResult<Vec<Note>> {
        let notes = Vec::new();
        self.write_notes(&notes)?;
        info!("event=notes_clear module=repo status=ok");
        Ok(notes)
    }

    /// Attaches `summary` to the note with `id`.
    ///
    /// Applying the same summary twice yields the same note.
    ///
    /// # Errors
    /// - `NotFound` when no note has `id`; nothing is written.
    pub fn attach_summary(&self, id: &str, summary: Summary) -> RepoResult<NoteChange> {
        let mut notes = self.list()?;
        let Some(target) = notes.iter_mut().find(|note| note.id == id) else {
            return Err(RepoError::NotFound(id.to_string()));
        };
        target.attach_summary(summary);
        target.validate()?;
        let note = target.clone();
        self.write_notes(&notes)?;

        info!(
            "event=note_summary_attach module=repo status=ok note_id={id} points={}",
            note.summary.as_ref().map_or(0, |summary| summary.points.len())
        );
        Ok(NoteChange { note, notes })
    }

    /// Renders the current collection; unknown formats degrade to markdown.
    pub fn render_export(&self, format: &str) -> RepoResult<String> {
        let format = ExportFormat::parse_lenient(format);
        let notes = self.list()?;
        export::render(&notes, format, Utc::now()).map_err(RepoError::Serialization)
    }

    /// Returns the cached summarizer credential, if any.
    pub fn cached_credential(&self) -> RepoResult<Option<String>> {
        let Some(raw) = self.store.get(CREDENTIAL_KEY)? else {
            return Ok(None);
        };
        let key: String = serde_json::from_str(&raw)
            .map_err(|err| RepoError::InvalidData(format!("`{CREDENTIAL_KEY}`: {err}")))?;
        let key = key.trim().to_string();
        Ok((!key.is_empty()).then_some(key))
    }

    pub fn cache_credential(&self, key: &str) -> RepoResult<()> {
        let encoded = serde_json::to_string(key.trim()).map_err(RepoError::Serialization)?;
        self.store.set(CREDENTIAL_KEY, &encoded)?;
        info!("event=credential_cache module=repo status=ok");
        Ok(())
    }

    pub fn forget_credential(&self) -> RepoResult<()> {
        self.store.remove(CREDENTIAL_KEY)?;
        info!("event=credential_forget module=repo status=ok");
        Ok(())
    }

    /// Forgets the cached credential only if it still equals `rejected`.
    ///
    /// Returns whether the credential was removed. A key cached after the
    /// rejected one survives.
    pub fn forget_credential_if(&self, rejected: &str) -> RepoResult<bool> {
        match self.cached_credential()? {
            Some(current) if current == rejected.trim() => {
                self.forget_credential()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn write_notes(&self, notes: &[Note]) -> RepoResult<()> {
        let encoded = serde_json::to_string(notes).map_err(RepoError::Serialization)?;
        self.store.set(NOTES_KEY, &encoded)?;
        Ok(())
    }
}

/// Joins notes into the `"<title>: <text>"` blocks fed to collection summaries.
pub fn compose_notes_text(notes: &[Note]) -> String {
    notes
        .iter()
        .map(|note| format!("{}: {}", note.title, note.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
