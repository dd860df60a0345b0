//! Single-owner coordinator hosting the note repository.
//!
//! # Responsibility
//! - Own the only `NoteRepository` and therefore the only store writer.
//! - Dispatch protocol requests and answer each one exactly once.
//! - Publish `notesUpdated` after every successful mutation.
//!
//! # Invariants
//! - The dispatch loop runs every repository call to completion before it
//!   takes the next command, so mutations never overlap.
//! - Summarizer calls run on spawned tasks; their store effects come back to
//!   the loop as internal commands.
//! - Failures are answered as `{success: false, error}`; nothing is dropped
//!   while the loop is alive.

use crate::logging::sanitize_message;
use crate::model::note::{Note, NoteId, Summary};
use crate::protocol::{
    OverallSummaryPayload, Request, Response, ERR_API_KEY_REQUIRED, ERR_INVALID_API_KEY,
    ERR_NOTE_NOT_FOUND, ERR_NO_NOTES, ERR_UNAVAILABLE,
};
use crate::repo::note_repo::{compose_notes_text, NoteRepository, RepoError, RepoResult};
use crate::store::PersistentStore;
use crate::summarizer::{
    fallback_note_summary, fallback_overall_summary, parse_note_summary, GenerationRequest,
    Summarizer, SummarizerError,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

mod broadcast;

pub use broadcast::{Delivery, NotesBroadcaster, NotesSubscriptions, NotificationReceiver};

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_BROADCAST_CAPACITY: usize = 64;
const MAX_LOGGED_ERROR_CHARS: usize = 200;

/// Channel sizing for one coordinator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Requests buffered before senders wait.
    pub queue_capacity: usize,
    /// Notifications buffered per listener before it lags.
    pub broadcast_capacity: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

enum Command {
    Client {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    ApplySummary {
        note_id: NoteId,
        summary: Summary,
        started_at: Instant,
        reply: oneshot::Sender<Response>,
    },
    ForgetCredential {
        rejected: String,
    },
    Shutdown,
}

/// Cloneable entry point used by page agents and panels.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    notifications: NotesSubscriptions,
}

impl CoordinatorHandle {
    /// Sends one request and waits for its answer.
    ///
    /// Answers `ERR_UNAVAILABLE` when the coordinator has stopped.
    pub async fn request(&self, request: Request) -> Response {
        let (reply, answer) = oneshot::channel();
        if self
            .commands
            .send(Command::Client { request, reply })
            .await
            .is_err()
        {
            return Response::failure(ERR_UNAVAILABLE);
        }
        answer
            .await
            .unwrap_or_else(|_| Response::failure(ERR_UNAVAILABLE))
    }

    /// JSON-in/JSON-out variant of `request` for wire-level callers.
    pub async fn request_json(&self, raw: &str) -> String {
        let response = match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.request(request).await,
            Err(err) => Response::failure(format!("malformed request: {err}")),
        };
        serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"success":false,"error":"failed to encode response"}"#.to_string()
        })
    }

    /// Starts listening for `notesUpdated` broadcasts.
    ///
    /// Only updates published after this call are delivered. Once the
    /// coordinator has stopped the receiver reports `Delivery::Closed`.
    pub fn subscribe(&self) -> NotificationReceiver {
        self.notifications.subscribe()
    }
}

/// Running coordinator: the dispatch task plus a handle to it.
pub struct Coordinator {
    handle: CoordinatorHandle,
    task: JoinHandle<()>,
}

impl Coordinator {
    /// Spawns the dispatch loop on the current tokio runtime.
    pub fn spawn<S>(
        repo: NoteRepository<S>,
        summarizer: Arc<dyn Summarizer>,
        options: CoordinatorOptions,
    ) -> Self
    where
        S: PersistentStore + 'static,
    {
        let (commands, inbox) = mpsc::channel(options.queue_capacity.max(1));
        let broadcaster = NotesBroadcaster::new(options.broadcast_capacity);
        let notifications = broadcaster.subscriptions();
        let dispatcher = Dispatcher {
            repo,
            summarizer,
            broadcaster,
            loopback: commands.downgrade(),
        };
        let task = tokio::spawn(dispatcher.run(inbox));

        Self {
            handle: CoordinatorHandle {
                commands,
                notifications,
            },
            task,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// Stops the dispatch loop and waits for it to exit.
    ///
    /// Requests still queued or in flight are answered `ERR_UNAVAILABLE`.
    pub async fn shutdown(self) {
        let _ = self.handle.commands.send(Command::Shutdown).await;
        if let Err(err) = self.task.await {
            error!("event=coordinator_stop module=coordinator status=error error={err}");
        }
    }
}

struct Dispatcher<S: PersistentStore> {
    repo: NoteRepository<S>,
    summarizer: Arc<dyn Summarizer>,
    broadcaster: NotesBroadcaster,
    loopback: mpsc::WeakSender<Command>,
}

impl<S: PersistentStore> Dispatcher<S> {
    async fn run(self, mut inbox: mpsc::Receiver<Command>) {
        info!("event=coordinator_start module=coordinator status=ok");
        while let Some(command) = inbox.recv().await {
            match command {
                Command::Shutdown => break,
                Command::Client { request, reply } => self.handle_request(request, reply),
                Command::ApplySummary {
                    note_id,
                    summary,
                    started_at,
                    reply,
                } => {
                    let outcome = self.repo.attach_summary(&note_id, summary).map(|change| {
                        (Response::updated(change.note, change.notes.clone()), change.notes)
                    });
                    self.finish_mutation("generateSummary", started_at, reply, outcome);
                }
                Command::ForgetCredential { rejected } => {
                    match self.repo.forget_credential_if(&rejected) {
                        Ok(removed) => info!(
                            "event=credential_rejected module=coordinator status=ok removed={removed}"
                        ),
                        Err(err) => warn!(
                            "event=credential_rejected module=coordinator status=error error={err}"
                        ),
                    }
                }
            }
        }
        info!("event=coordinator_stop module=coordinator status=ok");
    }

    fn handle_request(&self, request: Request, reply: oneshot::Sender<Response>) {
        let action = request.action();
        let started_at = Instant::now();
        debug!("event=request module=coordinator status=start action={action}");

        match request {
            Request::AddNote(payload) => {
                let outcome = self
                    .repo
                    .create(&payload.text, &payload.title, &payload.url)
                    .map(|change| {
                        (Response::created(change.note, change.notes.clone()), change.notes)
                    });
                self.finish_mutation(action, started_at, reply, outcome);
            }
            Request::DeleteNote(target) => {
                let outcome = self
                    .repo
                    .delete(&target.note_id)
                    .map(|notes| (Response::with_notes(notes.clone()), notes));
                self.finish_mutation(action, started_at, reply, outcome);
            }
            Request::ClearAllNotes => {
                let outcome = self
                    .repo
                    .clear_all()
                    .map(|notes| (Response::with_notes(notes.clone()), notes));
                self.finish_mutation(action, started_at, reply, outcome);
            }
            Request::GetNotes => {
                let response = self
                    .repo
                    .list()
                    .map_or_else(|err| repo_failure(&err), Response::with_notes);
                respond(action, started_at, reply, response);
            }
            Request::ExportNotes(payload) => {
                let response = self
                    .repo
                    .render_export(&payload.format)
                    .map_or_else(|err| repo_failure(&err), Response::exported);
                respond(action, started_at, reply, response);
            }
            Request::GenerateSummary(target) => {
                self.start_note_summary(target.note_id, started_at, reply);
            }
            Request::GenerateOverallSummary(payload) => {
                self.start_overall_summary(payload, started_at, reply);
            }
        }
    }

    /// Broadcasts and answers a successful mutation, or answers its failure.
    fn finish_mutation(
        &self,
        action: &'static str,
        started_at: Instant,
        reply: oneshot::Sender<Response>,
        outcome: RepoResult<(Response, Vec<Note>)>,
    ) {
        match outcome {
            Ok((response, notes)) => {
                self.broadcaster.publish(&notes);
                respond(action, started_at, reply, response);
            }
            Err(err) => respond(action, started_at, reply, repo_failure(&err)),
        }
    }

    fn start_note_summary(
        &self,
        note_id: NoteId,
        started_at: Instant,
        reply: oneshot::Sender<Response>,
    ) {
        const ACTION: &str = "generateSummary";

        let note = match self.repo.get(&note_id) {
            Ok(Some(note)) => note,
            Ok(None) => {
                return respond(ACTION, started_at, reply, Response::failure(ERR_NOTE_NOT_FOUND))
            }
            Err(err) => return respond(ACTION, started_at, reply, repo_failure(&err)),
        };
        let credential = match self.repo.cached_credential() {
            Ok(credential) => credential,
            Err(err) => return respond(ACTION, started_at, reply, repo_failure(&err)),
        };
        let Some(loopback) = self.loopback.upgrade() else {
            return respond(ACTION, started_at, reply, Response::failure(ERR_UNAVAILABLE));
        };
        let summarizer = Arc::clone(&self.summarizer);

        tokio::spawn(async move {
            let summary = match credential {
                None => {
                    info!(
                        "event=note_summary module=coordinator status=degraded reason=no_credential"
                    );
                    fallback_note_summary(&note.text)
                }
                Some(key) => {
                    let request = GenerationRequest::for_note(&note.text);
                    match summarizer.generate(&request, &key).await {
                        Ok(raw) => parse_note_summary(&raw),
                        Err(SummarizerError::Auth(_)) => {
                            let _ = loopback
                                .send(Command::ForgetCredential { rejected: key })
                                .await;
                            return respond(
                                ACTION,
                                started_at,
                                reply,
                                Response::failure(ERR_INVALID_API_KEY),
                            );
                        }
                        Err(err) => {
                            warn!(
                                "event=note_summary module=coordinator status=degraded error={}",
                                sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                            );
                            fallback_note_summary(&note.text)
                        }
                    }
                }
            };

            let apply = Command::ApplySummary {
                note_id: note.id,
                summary,
                started_at,
                reply,
            };
            if let Err(mpsc::error::SendError(Command::ApplySummary { reply, .. })) =
                loopback.send(apply).await
            {
                respond(ACTION, started_at, reply, Response::failure(ERR_UNAVAILABLE));
            }
        });
    }

    fn start_overall_summary(
        &self,
        payload: OverallSummaryPayload,
        started_at: Instant,
        reply: oneshot::Sender<Response>,
    ) {
        const ACTION: &str = "generateOverallSummary";

        let notes_text = match payload.notes_text.filter(|text| !text.trim().is_empty()) {
            Some(text) => text,
            None => match self.repo.list() {
                Ok(notes) => compose_notes_text(&notes),
                Err(err) => return respond(ACTION, started_at, reply, repo_failure(&err)),
            },
        };
        if notes_text.trim().is_empty() {
            return respond(ACTION, started_at, reply, Response::failure(ERR_NO_NOTES));
        }

        let supplied_key = payload
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        let api_key = match supplied_key {
            Some(key) => {
                if let Err(err) = self.repo.cache_credential(&key) {
                    warn!("event=credential_cache module=coordinator status=error error={err}");
                }
                Some(key)
            }
            None => match self.repo.cached_credential() {
                Ok(key) => key,
                Err(err) => return respond(ACTION, started_at, reply, repo_failure(&err)),
            },
        };
        let Some(api_key) = api_key else {
            return respond(ACTION, started_at, reply, Response::failure(ERR_API_KEY_REQUIRED));
        };

        let loopback = self.loopback.upgrade();
        let summarizer = Arc::clone(&self.summarizer);

        tokio::spawn(async move {
            let request = GenerationRequest::for_collection(&notes_text);
            let response = match summarizer.generate(&request, &api_key).await {
                Ok(raw) => Response::overall_summary(raw.trim()),
                Err(SummarizerError::Auth(_)) => {
                    if let Some(loopback) = loopback {
                        let _ = loopback
                            .send(Command::ForgetCredential { rejected: api_key })
                            .await;
                    }
                    Response::failure(ERR_INVALID_API_KEY)
                }
                Err(SummarizerError::MissingCredential) => Response::failure(ERR_API_KEY_REQUIRED),
                Err(err) => {
                    warn!(
                        "event=overall_summary module=coordinator status=degraded error={}",
                        sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                    );
                    Response::overall_summary(fallback_overall_summary(&notes_text))
                }
            };
            respond(ACTION, started_at, reply, response);
        });
    }
}

fn repo_failure(err: &RepoError) -> Response {
    match err {
        RepoError::NotFound(_) => Response::failure(ERR_NOTE_NOT_FOUND),
        other => Response::failure(other.to_string()),
    }
}

fn respond(
    action: &'static str,
    started_at: Instant,
    reply: oneshot::Sender<Response>,
    response: Response,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match response.error_message() {
        None => info!(
            "event=request module=coordinator status=ok action={action} duration_ms={duration_ms}"
        ),
        Some(message) => warn!(
            "event=request module=coordinator status=error action={action} duration_ms={duration_ms} error={message}"
        ),
    }
    if reply.send(response).is_err() {
        debug!("event=request module=coordinator status=abandoned action={action}");
    }
}
