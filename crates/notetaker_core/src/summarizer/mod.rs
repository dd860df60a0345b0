//! Summarizer adapter contract and degrade-gracefully policy.
//!
//! # Responsibility
//! - Define the external generation call behind the `Summarizer` trait.
//! - Build note and collection prompts with their generation parameters.
//! - Turn raw model output into a `Summary`, or a local stub on failure.
//!
//! # Invariants
//! - Unparsable output is wrapped, never reported as an error.
//! - Only `Auth` is meant to surface to users; transport failures fall back.
//! - No timeout is enforced here.

use crate::model::note::Summary;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod gemini;

pub use gemini::{GeminiSummarizer, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Title used when model output is not a structured summary.
pub const FALLBACK_SUMMARY_TITLE: &str = "AI-Generated Summary";

const NOTE_MAX_OUTPUT_TOKENS: u32 = 1024;
const COLLECTION_MAX_OUTPUT_TOKENS: u32 = 2048;

static FENCED_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("valid fenced json regex")
});

/// Sampling parameters sent with every prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    fn with_max_output(max_output_tokens: u32) -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens,
        }
    }
}

/// One outbound generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

impl GenerationRequest {
    /// Prompt asking for a `{title, points}` JSON summary of one passage.
    pub fn for_note(text: &str) -> Self {
        Self {
            prompt: format!(
                "Please analyze the following text and provide a structured summary with key points:\n\n\"{text}\"\n\nFormat your response as a JSON object with a \"title\" field and a \"points\" array containing the main insights."
            ),
            params: GenerationParams::with_max_output(NOTE_MAX_OUTPUT_TOKENS),
        }
    }

    /// Prompt asking for a free-form overview across all notes.
    pub fn for_collection(notes_text: &str) -> Self {
        Self {
            prompt: format!(
                "Please analyze all the following notes and provide a comprehensive summary that identifies key themes, insights, and patterns across all the content:\n\n{notes_text}\n\nProvide a clear, well-structured summary that captures the main ideas and connections between the different notes."
            ),
            params: GenerationParams::with_max_output(COLLECTION_MAX_OUTPUT_TOKENS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizerError {
    /// No credential was supplied for the call.
    MissingCredential,
    /// The credential was rejected by the service.
    Auth(String),
    /// Network failure, non-2xx status, or a response without text.
    Transport(String),
}

impl Display for SummarizerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "summarizer credential is missing"),
            Self::Auth(message) => write!(f, "summarizer rejected credential: {message}"),
            Self::Transport(message) => write!(f, "summarizer call failed: {message}"),
        }
    }
}

impl Error for SummarizerError {}

/// External text generation service.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Runs one generation call and returns the raw output text.
    async fn generate(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<String, SummarizerError>;
}

/// Decodes model output into a structured summary.
///
/// Accepts plain JSON or JSON inside a fenced block; anything else is wrapped
/// as a single point under `FALLBACK_SUMMARY_TITLE`.
pub fn parse_note_summary(raw: &str) -> Summary {
    let candidate = FENCED_JSON_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |body| body.as_str());

    match serde_json::from_str::<Summary>(candidate.trim()) {
        Ok(summary) => summary,
        Err(_) => Summary::new(FALLBACK_SUMMARY_TITLE, vec![raw.to_string()]),
    }
}

/// Local stub used when the service cannot be reached for one note.
pub fn fallback_note_summary(text: &str) -> Summary {
    Summary::new(
        FALLBACK_SUMMARY_TITLE,
        vec![
            "Key insight extracted from the highlighted text".to_string(),
            "Important information identified by AI analysis".to_string(),
            "Structured summary for easy reference".to_string(),
            format!("Text length: {} characters", text.chars().count()),
        ],
    )
}

/// Local stub used when the service cannot be reached for the collection.
pub fn fallback_overall_summary(notes_text: &str) -> String {
    let note_count = notes_text
        .split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .count();
    format!(
        "Offline overview of {note_count} note(s), {} characters in total. The summarization service could not be reached; generate again later for an AI-written summary.",
        notes_text.chars().count()
    )
}
