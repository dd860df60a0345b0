//! Gemini `generateContent` client implementing `Summarizer`.

use super::{GenerationRequest, Summarizer, SummarizerError};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const INVALID_KEY_MARKER: &str = "API_KEY_INVALID";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP summarizer backed by the Gemini REST API.
pub struct GeminiSummarizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiSummarizer {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.trim().to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

impl Default for GeminiSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MODEL)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn generate(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<String, SummarizerError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(SummarizerError::MissingCredential);
        }

        let started_at = Instant::now();
        let body = GenerateContentBody {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.prompt.as_str(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.params.temperature,
                top_k: request.params.top_k,
                top_p: request.params.top_p,
                max_output_tokens: request.params.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(
                    "event=summarizer_call module=summarizer status=error error_code=transport duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                SummarizerError::Transport(err.without_url().to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                "event=summarizer_call module=summarizer status=error http_status={} duration_ms={}",
                status.as_u16(),
                started_at.elapsed().as_millis()
            );
            if status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN
                || detail.contains(INVALID_KEY_MARKER)
            {
                return Err(SummarizerError::Auth(format!("HTTP {}", status.as_u16())));
            }
            return Err(SummarizerError::Transport(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let decoded: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| SummarizerError::Transport(format!("malformed response: {err}")))?;

        let text = decoded
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .find_map(|part| part.text)
            .ok_or_else(|| {
                SummarizerError::Transport("response carried no candidate text".to_string())
            })?;

        info!(
            "event=summarizer_call module=summarizer status=ok output_chars={} duration_ms={}",
            text.chars().count(),
            started_at.elapsed().as_millis()
        );
        Ok(text)
    }
}
