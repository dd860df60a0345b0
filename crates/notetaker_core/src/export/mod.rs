//! Export rendering for the note collection.
//!
//! # Responsibility
//! - Render the collection as markdown, pretty JSON or plain text.
//! - Map format names to file names and MIME types for download collaborators.
//!
//! # Invariants
//! - Rendering is a pure function of `(notes, exported_at)`.
//! - Unknown format names degrade to markdown through `parse_lenient`.

use crate::model::note::Note;
use chrono::{DateTime, Utc};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const EXPORT_HEADING: &str = "AI Note-Taker Export";
const TXT_RULE_WIDTH: usize = 50;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Supported export serializations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Json,
    Txt,
}

/// Returned by strict parsing for an unrecognized format name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedFormatError(pub String);

impl Display for UnsupportedFormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported export format `{}`; expected markdown|json|txt",
            self.0
        )
    }
}

impl Error for UnsupportedFormatError {}

impl FromStr for ExportFormat {
    type Err = UnsupportedFormatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "txt" | "text" => Ok(Self::Txt),
            _ => Err(UnsupportedFormatError(value.to_string())),
        }
    }
}

impl ExportFormat {
    /// Parses a format name, falling back to markdown for unknown values.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse::<Self>().unwrap_or_else(|err| {
            warn!(
                "event=export_format_fallback module=export status=degraded requested={} fallback=markdown",
                err.0
            );
            Self::Markdown
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Txt => "txt",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Markdown => "ai-notes.md",
            Self::Json => "ai-notes.json",
            Self::Txt => "ai-notes.txt",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown",
            Self::Json => "application/json",
            Self::Txt => "text/plain",
        }
    }
}

/// Renders `notes` in the requested format.
///
/// # Errors
/// - Returns a serialization error only for the JSON format.
pub fn render(
    notes: &[Note],
    format: ExportFormat,
    exported_at: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Markdown => Ok(render_markdown(notes, exported_at)),
        ExportFormat::Json => serde_json::to_string_pretty(notes),
        ExportFormat::Txt => Ok(render_plain_text(notes, exported_at)),
    }
}

fn render_markdown(notes: &[Note], exported_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "# {EXPORT_HEADING}\n\nExported on: {}\nTotal Notes: {}\n\n---\n\n",
        exported_at.format(DATE_FORMAT),
        notes.len()
    );

    for (index, note) in notes.iter().enumerate() {
        out.push_str(&format!("## Note {}\n\n", index + 1));
        out.push_str(&format!("**Date:** {}\n\n", format_note_date(note.timestamp)));
        out.push_str("**Text:**\n");
        for line in note.text.lines() {
            out.push_str(&format!("> {line}\n"));
        }
        out.push('\n');
        if let Some(summary) = note.summary.as_ref() {
            out.push_str(&format!("**Summary:** {}\n\n", summary.title));
            for point in &summary.points {
                out.push_str(&format!("- {point}\n"));
            }
            if !summary.points.is_empty() {
                out.push('\n');
            }
        }
        out.push_str(&format!("**Source:** [{}]({})\n\n", note.title, note.url));
        out.push_str("---\n\n");
    }

    out
}

fn render_plain_text(notes: &[Note], exported_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "{EXPORT_HEADING}\n\nExported on: {}\nTotal Notes: {}\n\n",
        exported_at.format(DATE_FORMAT),
        notes.len()
    );
    let rule = "=".repeat(TXT_RULE_WIDTH);

    for (index, note) in notes.iter().enumerate() {
        out.push_str(&format!("Note {}\n", index + 1));
        out.push_str(&format!("Date: {}\n", format_note_date(note.timestamp)));
        out.push_str(&format!("Text: {}\n", note.text));
        if let Some(summary) = note.summary.as_ref() {
            out.push_str(&format!("Summary: {}\n", summary.title));
            for point in &summary.points {
                out.push_str(&format!("  * {point}\n"));
            }
        }
        out.push_str(&format!("Source: {} ({})\n\n", note.title, note.url));
        out.push_str(&rule);
        out.push_str("\n\n");
    }

    out
}

fn format_note_date(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|value| value.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| "unknown date".to_string())
}

#[cfg(test)]
mod tests {
    use super::{render, ExportFormat};
    use crate::model::note::{Note, Summary};
    use chrono::{TimeZone, Utc};

    fn exported_at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn lenient_parse_falls_back_to_markdown() {
        assert_eq!(ExportFormat::parse_lenient("JSON"), ExportFormat::Json);
        assert_eq!(ExportFormat::parse_lenient("pdf"), ExportFormat::Markdown);
        assert_eq!(ExportFormat::parse_lenient(""), ExportFormat::Markdown);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn markdown_quotes_every_text_line_and_links_source() {
        let note = Note::with_id("note_1", "first\nsecond", "Page A", "http://a", 0);
        let out = render(&[note], ExportFormat::Markdown, exported_at()).unwrap();
        assert!(out.contains("Exported on: 2024-03-05"));
        assert!(out.contains("Total Notes: 1"));
        assert!(out.contains("## Note 1"));
        assert!(out.contains("**Date:** 1970-01-01"));
        assert!(out.contains("> first\n> second\n"));
        assert!(out.contains("**Source:** [Page A](http://a)"));
    }

    #[test]
    fn markdown_renders_summary_points() {
        let mut note = Note::with_id("note_1", "body", "Page", "http://p", 0);
        note.attach_summary(Summary::new("S", vec!["p1".to_string()]));
        let out = render(&[note], ExportFormat::Markdown, exported_at()).unwrap();
        assert!(out.contains("**Summary:** S"));
        assert!(out.contains("- p1"));
    }

    #[test]
    fn txt_separates_notes_with_rule() {
        let notes = vec![
            Note::with_id("note_2", "two", "B", "http://b", 0),
            Note::with_id("note_1", "one", "A", "http://a", 0),
        ];
        let out = render(&notes, ExportFormat::Txt, exported_at()).unwrap();
        assert_eq!(out.matches(&"=".repeat(50)).count(), 2);
        assert!(out.contains("Note 2\n"));
        assert!(out.contains("Source: A (http://a)"));
        assert!(!out.contains("**"));
    }
}
