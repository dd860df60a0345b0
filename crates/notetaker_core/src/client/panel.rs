//! Detachable note browser that stays in sync through broadcasts.

use super::{accepted, ClientError};
use crate::coordinator::{CoordinatorHandle, Delivery, NotificationReceiver};
use crate::export::ExportFormat;
use crate::model::note::Note;
use crate::protocol::{OverallSummaryPayload, Request, ERR_API_KEY_REQUIRED, ERR_UNAVAILABLE};
use log::{debug, info};

/// Asks the user for a summarizer credential.
pub trait CredentialPrompt: Send + Sync {
    /// Returns `None` when the user cancels.
    fn request_api_key(&self) -> Option<String>;
}

/// Rendered export ready to hand to a download collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub format: ExportFormat,
    pub file_name: &'static str,
    pub mime_type: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverallSummaryOutcome {
    Generated(String),
    /// The user dismissed the credential prompt.
    Cancelled,
}

/// Note browser holding a snapshot that is only valid while the view is open.
pub struct PanelClient {
    coordinator: CoordinatorHandle,
    notifications: Option<NotificationReceiver>,
    notes: Vec<Note>,
}

impl PanelClient {
    pub fn new(coordinator: CoordinatorHandle) -> Self {
        Self {
            coordinator,
            notifications: None,
            notes: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.notifications.is_some()
    }

    /// Subscribes to broadcasts, then fetches the full collection.
    ///
    /// Subscribing first means no update published after the fetch is lost.
    pub async fn open(&mut self) -> Result<&[Note], ClientError> {
        self.notifications = Some(self.coordinator.subscribe());
        self.refresh().await?;
        info!(
            "event=panel_open module=panel status=ok notes={}",
            self.notes.len()
        );
        Ok(&self.notes)
    }

    /// Stops listening and drops the snapshot.
    pub fn close(&mut self) {
        self.notifications = None;
        self.notes.clear();
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Replaces the snapshot with a fresh `getNotes` answer.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        self.notes = accepted(self.coordinator.request(Request::GetNotes).await)?
            .notes
            .ok_or(ClientError::MissingField("notes"))?;
        Ok(())
    }

    /// Applies pending broadcasts without waiting.
    ///
    /// Keeps only the newest collection; a lagged or closed channel triggers a
    /// full re-fetch. Returns whether the snapshot changed.
    pub async fn sync(&mut self) -> Result<bool, ClientError> {
        let Some(receiver) = self.notifications.as_mut() else {
            return Ok(false);
        };

        let mut latest = None;
        let mut refetch = false;
        let mut closed = false;
        while let Some(delivery) = receiver.try_recv() {
            match delivery {
                Delivery::Notes(notes) => latest = Some(notes),
                Delivery::Lagged(skipped) => {
                    debug!("event=panel_sync module=panel status=lagged skipped={skipped}");
                    refetch = true;
                }
                Delivery::Closed => {
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            self.notifications = None;
            return Err(ClientError::Rejected(ERR_UNAVAILABLE.to_string()));
        }
        if refetch {
            let before = std::mem::take(&mut self.notes);
            self.refresh().await?;
            return Ok(before != self.notes);
        }
        match latest {
            Some(notes) => {
                let changed = notes != self.notes;
                self.notes = notes;
                Ok(changed)
            }
            None => Ok(false),
        }
    }

    /// Waits for the next broadcast and applies it.
    ///
    /// Returns `Ok(false)` immediately when the panel is closed.
    pub async fn wait_for_update(&mut self) -> Result<bool, ClientError> {
        let Some(receiver) = self.notifications.as_mut() else {
            return Ok(false);
        };
        match receiver.recv().await {
            Delivery::Notes(notes) => {
                self.notes = notes;
                Ok(true)
            }
            Delivery::Lagged(_) => {
                self.refresh().await?;
                Ok(true)
            }
            Delivery::Closed => {
                self.notifications = None;
                Err(ClientError::Rejected(ERR_UNAVAILABLE.to_string()))
            }
        }
    }

    pub async fn delete_note(&mut self, note_id: &str) -> Result<(), ClientError> {
        let response = accepted(self.coordinator.request(Request::delete_note(note_id)).await)?;
        self.adopt(response.notes);
        Ok(())
    }

    pub async fn clear_all(&mut self) -> Result<(), ClientError> {
        let response = accepted(self.coordinator.request(Request::ClearAllNotes).await)?;
        self.adopt(response.notes);
        Ok(())
    }

    /// Attaches a generated summary to one note and returns the updated note.
    pub async fn summarize_note(&mut self, note_id: &str) -> Result<Note, ClientError> {
        let response = accepted(
            self.coordinator
                .request(Request::generate_summary(note_id))
                .await,
        )?;
        let note = response
            .updated_note
            .ok_or(ClientError::MissingField("updatedNote"))?;
        self.adopt(response.notes);
        Ok(note)
    }

    /// Renders an export; unknown formats come back as markdown.
    pub async fn export(&self, format: &str) -> Result<ExportedFile, ClientError> {
        let format = ExportFormat::parse_lenient(format);
        let response = accepted(
            self.coordinator
                .request(Request::export_notes(format.as_str()))
                .await,
        )?;
        Ok(ExportedFile {
            format,
            file_name: format.file_name(),
            mime_type: format.mime_type(),
            content: response.data.ok_or(ClientError::MissingField("data"))?,
        })
    }

    /// Generates an overview of all stored notes.
    ///
    /// Uses the cached credential first; when none is cached, asks `prompt`
    /// once and retries with the entered key.
    pub async fn generate_overall_summary(
        &self,
        prompt: &dyn CredentialPrompt,
    ) -> Result<OverallSummaryOutcome, ClientError> {
        let first = self
            .coordinator
            .request(Request::GenerateOverallSummary(
                OverallSummaryPayload::default(),
            ))
            .await;
        let needs_key = first.error_message() == Some(ERR_API_KEY_REQUIRED);
        let response = if needs_key {
            let Some(api_key) = prompt
                .request_api_key()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
            else {
                return Ok(OverallSummaryOutcome::Cancelled);
            };
            self.coordinator
                .request(Request::GenerateOverallSummary(OverallSummaryPayload {
                    notes_text: None,
                    api_key: Some(api_key),
                }))
                .await
        } else {
            first
        };

        let summary = accepted(response)?
            .summary
            .ok_or(ClientError::MissingField("summary"))?;
        Ok(OverallSummaryOutcome::Generated(summary))
    }

    fn adopt(&mut self, notes: Option<Vec<Note>>) {
        if let Some(notes) = notes {
            self.notes = notes;
        }
    }
}
