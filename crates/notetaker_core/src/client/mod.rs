//! Clients that reach the coordinator only through the request protocol.
//!
//! # Responsibility
//! - `PageAgent`: capture selections from one page as notes.
//! - `PanelClient`: browse, mutate, export and summarize notes while staying
//!   in sync through `notesUpdated` broadcasts.
//!
//! # Invariants
//! - Clients never touch the persistent store.
//! - A client snapshot is stale until the next broadcast or re-fetch.

use crate::model::note::NoteValidationError;
use crate::protocol::Response;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod page_agent;
mod panel;

pub use page_agent::{PageAgent, PageContext, CAPTURE_MIN_CHARS};
pub use panel::{CredentialPrompt, ExportedFile, OverallSummaryOutcome, PanelClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Rejected locally before any request was sent.
    Validation(NoteValidationError),
    /// The coordinator answered `{success: false, error}`.
    Rejected(String),
    /// A successful response lacked a field required by the action.
    MissingField(&'static str),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Rejected(message) => write!(f, "request rejected: {message}"),
            Self::MissingField(field) => write!(f, "response is missing `{field}`"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Rejected(_) | Self::MissingField(_) => None,
        }
    }
}

impl ClientError {
    /// Returns the coordinator error string for rejected requests.
    pub fn rejection(&self) -> Option<&str> {
        match self {
            Self::Rejected(message) => Some(message.as_str()),
            _ => None,
        }
    }
}

pub(crate) fn accepted(response: Response) -> Result<Response, ClientError> {
    match response.error_message() {
        None => Ok(response),
        Some(message) => Err(ClientError::Rejected(message.to_string())),
    }
}
