//! Command-line host for the note coordinator.
//!
//! # Responsibility
//! - Open the configured SQLite store and spawn one coordinator over it.
//! - Drive every command through the same request protocol the clients use.
//! - Print the JSON response (or the rendered export) and exit non-zero on
//!   `{success: false}`.

use clap::{Parser, Subcommand};
use log::{error, info};
use notetaker_core::protocol::OverallSummaryPayload;
use notetaker_core::{
    init_logging_from_config, Coordinator, CoreConfig, GeminiSummarizer, NoteRepository,
    PageAgent, PageContext, Request, Response, SqliteStore,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "notetaker", version, about = "Capture, browse and summarize notes")]
struct Cli {
    /// SQLite file holding the notes; overrides NOTETAKER_DB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a passage as a new note.
    Add {
        text: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        url: String,
    },
    /// Print all notes, newest first.
    List,
    /// Delete one note by id.
    Delete { note_id: String },
    /// Delete every note.
    Clear,
    /// Render all notes as markdown, json or txt.
    Export {
        #[arg(long, default_value = "markdown")]
        format: String,
    },
    /// Generate and attach a summary for one note.
    Summarize { note_id: String },
    /// Summarize the whole collection.
    Overview {
        /// Credential to use and cache; the cached one is used when omitted.
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Err(err) = init_logging_from_config(&config) {
        eprintln!("logging disabled: {err}");
    }

    let store = match SqliteStore::open(&config.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!("event=cli_start module=cli status=error error={err}");
            eprintln!("cannot open `{}`: {err}", config.db_path.display());
            return ExitCode::FAILURE;
        }
    };
    let summarizer = GeminiSummarizer::new(&config.summarizer.base_url, &config.summarizer.model);
    let coordinator = Coordinator::spawn(
        NoteRepository::new(store),
        Arc::new(summarizer),
        config.coordinator,
    );
    info!(
        "event=cli_start module=cli status=ok db_path={}",
        config.db_path.display()
    );

    let code = run(&coordinator, cli.command).await;
    coordinator.shutdown().await;
    code
}

async fn run(coordinator: &Coordinator, command: Command) -> ExitCode {
    let handle = coordinator.handle();
    let response = match command {
        Command::Add { text, title, url } => {
            let agent = PageAgent::new(handle, PageContext::new(title, url));
            return match agent.capture(&text).await {
                Ok(note) => print_json(&note),
                Err(err) => {
                    eprintln!("{err}");
                    ExitCode::FAILURE
                }
            };
        }
        Command::List => handle.request(Request::GetNotes).await,
        Command::Delete { note_id } => handle.request(Request::delete_note(note_id)).await,
        Command::Clear => handle.request(Request::ClearAllNotes).await,
        Command::Export { format } => {
            let response = handle.request(Request::export_notes(format)).await;
            if let Some(data) = response.data.as_deref() {
                println!("{data}");
                return ExitCode::SUCCESS;
            }
            response
        }
        Command::Summarize { note_id } => {
            handle.request(Request::generate_summary(note_id)).await
        }
        Command::Overview { api_key } => {
            handle
                .request(Request::GenerateOverallSummary(OverallSummaryPayload {
                    notes_text: None,
                    api_key,
                }))
                .await
        }
    };
    report(&response)
}

fn report(response: &Response) -> ExitCode {
    if let Some(message) = response.error_message() {
        eprintln!("error: {message}");
        return ExitCode::FAILURE;
    }
    print_json(response)
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(encoded) => {
            println!("{encoded}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to encode output: {err}");
            ExitCode::FAILURE
        }
    }
}
