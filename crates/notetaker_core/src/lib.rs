//! Core of the note-taker: one coordinator owns the note store, every other
//! context reaches it through request messages and `notesUpdated` broadcasts.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod export;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod repo;
pub mod store;
pub mod summarizer;

pub use client::{
    ClientError, CredentialPrompt, ExportedFile, OverallSummaryOutcome, PageAgent, PageContext,
    PanelClient,
};
pub use config::{ConfigError, CoreConfig, SummarizerConfig};
pub use coordinator::{
    Coordinator, CoordinatorHandle, CoordinatorOptions, Delivery, NotesBroadcaster,
    NotesSubscriptions, NotificationReceiver,
};
pub use export::{ExportFormat, UnsupportedFormatError};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::note::{Note, NoteId, NoteValidationError, Summary};
pub use protocol::{Notification, Request, Response};
pub use repo::note_repo::{NoteChange, NoteRepository, RepoError, RepoResult};
pub use store::{ChangeKind, PersistentStore, SqliteStore, StorageChange, StoreError};
pub use summarizer::{GeminiSummarizer, GenerationRequest, Summarizer, SummarizerError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
