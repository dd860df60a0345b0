use async_trait::async_trait;
use notetaker_core::protocol::{
    OverallSummaryPayload, ERR_API_KEY_REQUIRED, ERR_INVALID_API_KEY, ERR_NOTE_NOT_FOUND,
    ERR_NO_NOTES, ERR_UNAVAILABLE,
};
use notetaker_core::repo::note_repo::CREDENTIAL_KEY;
use notetaker_core::store::StoreResult;
use notetaker_core::summarizer::FALLBACK_SUMMARY_TITLE;
use notetaker_core::{
    Coordinator, CoordinatorOptions, Delivery, GenerationRequest, NoteRepository,
    PersistentStore, Request, SqliteStore, StorageChange, StoreError, Summarizer,
    SummarizerError,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Summarizer returning one canned outcome and recording every key it sees.
struct ScriptedSummarizer {
    outcome: Result<String, SummarizerError>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedSummarizer {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing(err: SummarizerError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(err),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn keys(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn generate(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<String, SummarizerError> {
        self.calls
            .lock()
            .unwrap()
            .push((api_key.to_string(), request.prompt.clone()));
        self.outcome.clone()
    }
}

fn spawn_with(summarizer: Arc<ScriptedSummarizer>, cached_key: Option<&str>) -> Coordinator {
    let repo = NoteRepository::new(SqliteStore::open_in_memory().unwrap());
    if let Some(key) = cached_key {
        repo.cache_credential(key).unwrap();
    }
    Coordinator::spawn(repo, summarizer, CoordinatorOptions::default())
}

/// Store whose credential entry cannot be read.
struct SealedCredentialStore {
    inner: SqliteStore,
}

impl PersistentStore for SealedCredentialStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        if key == CREDENTIAL_KEY {
            return Err(StoreError::Backend("credential entry locked".to_string()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.inner.subscribe_changes()
    }
}

fn spawn_default() -> Coordinator {
    spawn_with(ScriptedSummarizer::replying("unused"), None)
}

#[tokio::test]
async fn back_to_back_creates_are_ordered_newest_first() {
    let coordinator = spawn_default();
    let handle = coordinator.handle();

    let first = handle.request(Request::add_note("A text", "A", "http://a")).await;
    let (second, snapshot) = tokio::join!(
        handle.request(Request::add_note("B text", "B", "http://b")),
        handle.request(Request::GetNotes),
    );

    let a_id = first.new_note.unwrap().id;
    let b_id = second.new_note.unwrap().id;
    let listed = handle.request(Request::GetNotes).await.notes.unwrap();
    let order: Vec<&str> = listed.iter().map(|note| note.id.as_str()).collect();
    assert_eq!(order, vec![b_id.as_str(), a_id.as_str()]);

    let seen = snapshot.notes.unwrap();
    assert!(seen.len() == 1 || seen.len() == 2);
    assert_eq!(seen.last().unwrap().id, a_id);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn successful_mutation_broadcasts_collection_before_reply() {
    let coordinator = spawn_default();
    let handle = coordinator.handle();
    let mut updates = handle.subscribe();

    let response = handle
        .request(Request::add_note("broadcast me", "Page", "http://x"))
        .await;

    assert!(response.success);
    match updates.try_recv() {
        Some(Delivery::Notes(notes)) => {
            assert_eq!(notes, response.notes.unwrap());
        }
        other => panic!("expected notes broadcast, got {other:?}"),
    }

    coordinator.shutdown().await;
}

#[tokio::test]
async fn reads_and_failures_do_not_broadcast() {
    let coordinator = spawn_default();
    let handle = coordinator.handle();
    let mut updates = handle.subscribe();

    let rejected = handle.request(Request::add_note("   ", "Page", "http://x")).await;
    let listed = handle.request(Request::GetNotes).await;
    let exported = handle.request(Request::export_notes("txt")).await;
    let missing = handle.request(Request::generate_summary("note_missing")).await;

    assert!(!rejected.success);
    assert!(listed.success);
    assert!(exported.success);
    assert_eq!(missing.error.as_deref(), Some(ERR_NOTE_NOT_FOUND));
    assert_eq!(updates.try_recv(), None);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn delete_and_clear_answer_with_remaining_notes() {
    let coordinator = spawn_default();
    let handle = coordinator.handle();
    let kept = handle
        .request(Request::add_note("kept passage", "Page", "http://x"))
        .await
        .new_note
        .unwrap();
    let dropped = handle
        .request(Request::add_note("dropped passage", "Page", "http://x"))
        .await
        .new_note
        .unwrap();

    let after_delete = handle.request(Request::delete_note(dropped.id)).await;
    assert_eq!(after_delete.notes.unwrap(), vec![kept]);

    let after_clear = handle.request(Request::ClearAllNotes).await;
    assert!(after_clear.notes.unwrap().is_empty());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn note_summary_without_credential_uses_local_stub() {
    let summarizer = ScriptedSummarizer::replying("unused");
    let coordinator = spawn_with(Arc::clone(&summarizer), None);
    let handle = coordinator.handle();
    let note = handle
        .request(Request::add_note("twenty characters ok", "Page", "http://x"))
        .await
        .new_note
        .unwrap();

    let response = handle.request(Request::generate_summary(&note.id)).await;

    let updated = response.updated_note.unwrap();
    assert!(updated.has_summary);
    let summary = updated.summary.unwrap();
    assert_eq!(summary.title, FALLBACK_SUMMARY_TITLE);
    assert_eq!(
        summary.points.last().map(String::as_str),
        Some("Text length: 20 characters")
    );
    assert!(summarizer.keys().is_empty());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn note_summary_with_credential_attaches_parsed_output_and_broadcasts() {
    let summarizer = ScriptedSummarizer::replying(
        "```json\n{\"title\": \"Key ideas\", \"points\": [\"one\", \"two\"]}\n```",
    );
    let coordinator = spawn_with(Arc::clone(&summarizer), Some("key-1"));
    let handle = coordinator.handle();
    let note = handle
        .request(Request::add_note("passage to summarize", "Page", "http://x"))
        .await
        .new_note
        .unwrap();
    let mut updates = handle.subscribe();

    let response = handle.request(Request::generate_summary(&note.id)).await;

    let updated = response.updated_note.unwrap();
    assert_eq!(updated.id, note.id);
    assert_eq!(updated.summary.as_ref().unwrap().title, "Key ideas");
    assert_eq!(updated.summary.as_ref().unwrap().points, vec!["one", "two"]);
    assert_eq!(summarizer.keys(), vec!["key-1"]);
    assert!(summarizer.prompts()[0].contains("passage to summarize"));
    assert!(matches!(updates.try_recv(), Some(Delivery::Notes(_))));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn rejected_credential_is_forgotten() {
    let summarizer = ScriptedSummarizer::failing(SummarizerError::Auth("HTTP 401".to_string()));
    let coordinator = spawn_with(Arc::clone(&summarizer), Some("bad-key"));
    let handle = coordinator.handle();
    let note = handle
        .request(Request::add_note("passage to summarize", "Page", "http://x"))
        .await
        .new_note
        .unwrap();

    let rejected = handle.request(Request::generate_summary(&note.id)).await;
    assert_eq!(rejected.error.as_deref(), Some(ERR_INVALID_API_KEY));
    let untouched = handle.request(Request::GetNotes).await.notes.unwrap();
    assert!(!untouched[0].has_summary);

    // With the key gone the next attempt degrades to the local stub.
    let retried = handle.request(Request::generate_summary(&note.id)).await;
    assert!(retried.success);
    assert_eq!(summarizer.keys(), vec!["bad-key"]);

    let overall = handle
        .request(Request::GenerateOverallSummary(OverallSummaryPayload::default()))
        .await;
    assert_eq!(overall.error.as_deref(), Some(ERR_API_KEY_REQUIRED));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn note_summary_transport_failure_falls_back() {
    let summarizer =
        ScriptedSummarizer::failing(SummarizerError::Transport("HTTP 503".to_string()));
    let coordinator = spawn_with(summarizer, Some("key-1"));
    let handle = coordinator.handle();
    let note = handle
        .request(Request::add_note("passage to summarize", "Page", "http://x"))
        .await
        .new_note
        .unwrap();

    let response = handle.request(Request::generate_summary(&note.id)).await;

    assert!(response.success);
    assert_eq!(
        response.updated_note.unwrap().summary.unwrap().title,
        FALLBACK_SUMMARY_TITLE
    );

    coordinator.shutdown().await;
}

#[tokio::test]
async fn overall_summary_checks_notes_before_credential() {
    let coordinator = spawn_default();
    let handle = coordinator.handle();

    let empty = handle
        .request(Request::GenerateOverallSummary(OverallSummaryPayload::default()))
        .await;
    assert_eq!(empty.error.as_deref(), Some(ERR_NO_NOTES));

    handle
        .request(Request::add_note("some passage", "Page", "http://x"))
        .await;
    let keyless = handle
        .request(Request::GenerateOverallSummary(OverallSummaryPayload::default()))
        .await;
    assert_eq!(keyless.error.as_deref(), Some(ERR_API_KEY_REQUIRED));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn overall_summary_caches_supplied_key_for_later_calls() {
    let summarizer = ScriptedSummarizer::replying("  Themes: reading.  ");
    let coordinator = spawn_with(Arc::clone(&summarizer), None);
    let handle = coordinator.handle();
    handle
        .request(Request::add_note("alpha passage", "Page A", "http://a"))
        .await;

    let supplied = handle
        .request(Request::GenerateOverallSummary(OverallSummaryPayload {
            notes_text: None,
            api_key: Some(" key-9 ".to_string()),
        }))
        .await;
    assert_eq!(supplied.summary.as_deref(), Some("Themes: reading."));

    let cached = handle
        .request(Request::GenerateOverallSummary(OverallSummaryPayload::default()))
        .await;
    assert!(cached.success);
    assert_eq!(summarizer.keys(), vec!["key-9", "key-9"]);
    assert!(summarizer.prompts()[0].contains("Page A: alpha passage"));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn overall_summary_prefers_supplied_notes_text() {
    let summarizer = ScriptedSummarizer::replying("overview");
    let coordinator = spawn_with(Arc::clone(&summarizer), Some("key-1"));
    let handle = coordinator.handle();

    let response = handle
        .request(Request::GenerateOverallSummary(OverallSummaryPayload {
            notes_text: Some("Custom: supplied text".to_string()),
            api_key: None,
        }))
        .await;

    assert_eq!(response.summary.as_deref(), Some("overview"));
    assert!(summarizer.prompts()[0].contains("Custom: supplied text"));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn overall_summary_transport_failure_returns_offline_overview() {
    let summarizer =
        ScriptedSummarizer::failing(SummarizerError::Transport("connection reset".to_string()));
    let coordinator = spawn_with(summarizer, Some("key-1"));
    let handle = coordinator.handle();
    handle
        .request(Request::add_note("first passage", "A", "http://a"))
        .await;
    handle
        .request(Request::add_note("second passage", "B", "http://b"))
        .await;

    let response = handle
        .request(Request::GenerateOverallSummary(OverallSummaryPayload::default()))
        .await;

    assert!(response.success);
    assert!(response.summary.unwrap().contains("2 note(s)"));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn json_requests_round_trip_through_wire_format() {
    let coordinator = spawn_default();
    let handle = coordinator.handle();

    let added: Value = serde_json::from_str(
        &handle
            .request_json(
                r#"{"action":"addNote","data":{"text":"wire passage","url":"http://w","title":"W"}}"#,
            )
            .await,
    )
    .unwrap();
    assert_eq!(added["success"], json!(true));
    assert_eq!(added["newNote"]["hasSummary"], json!(false));
    assert_eq!(added["newNote"]["text"], json!("wire passage"));

    let listed: Value =
        serde_json::from_str(&handle.request_json(r#"{"action":"getNotes"}"#).await).unwrap();
    assert_eq!(listed["notes"].as_array().unwrap().len(), 1);

    let malformed: Value =
        serde_json::from_str(&handle.request_json(r#"{"action":"launchRockets"}"#).await)
            .unwrap();
    assert_eq!(malformed["success"], json!(false));
    assert!(malformed["error"]
        .as_str()
        .unwrap()
        .starts_with("malformed request"));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn requests_after_shutdown_report_unavailable() {
    let coordinator = spawn_default();
    let handle = coordinator.handle();
    let mut updates = handle.subscribe();

    coordinator.shutdown().await;

    let response = tokio::time::timeout(Duration::from_secs(1), handle.request(Request::GetNotes))
        .await
        .expect("request must not hang after shutdown");
    assert_eq!(response.error.as_deref(), Some(ERR_UNAVAILABLE));
    assert_eq!(updates.try_recv(), Some(Delivery::Closed));
}

#[tokio::test]
async fn subscribing_after_shutdown_yields_closed_channel() {
    let coordinator = spawn_default();
    let handle = coordinator.handle();

    coordinator.shutdown().await;

    let mut updates = handle.subscribe();
    let delivery = tokio::time::timeout(Duration::from_secs(1), updates.recv())
        .await
        .expect("closed channel must not block");
    assert_eq!(delivery, Delivery::Closed);
}

#[tokio::test]
async fn unreadable_credential_fails_note_summary_without_writing() {
    let summarizer = ScriptedSummarizer::replying("unused");
    let repo = NoteRepository::new(SealedCredentialStore {
        inner: SqliteStore::open_in_memory().unwrap(),
    });
    let coordinator = Coordinator::spawn(repo, summarizer.clone(), CoordinatorOptions::default());
    let handle = coordinator.handle();
    let note = handle
        .request(Request::add_note("passage to summarize", "Page", "http://x"))
        .await
        .new_note
        .unwrap();
    let mut updates = handle.subscribe();

    let response = handle.request(Request::generate_summary(&note.id)).await;

    assert!(!response.success);
    assert!(response
        .error
        .as_deref()
        .is_some_and(|message| message.contains("credential entry locked")));
    assert_eq!(updates.try_recv(), None);
    assert!(summarizer.keys().is_empty());
    let listed = handle.request(Request::GetNotes).await.notes.unwrap();
    assert_eq!(listed, vec![note]);

    coordinator.shutdown().await;
}
