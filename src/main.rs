//! # cortexqa CLI (`cqa`)
//!
//! The `cqa` binary runs the question-answering service and provides a
//! one-shot query mode for local files.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cqa serve` | Start the JSON HTTP server |
//! | `cqa query <file> "<question>"` | Ingest a file and answer one question |
//!
//! ## Examples
//!
//! ```bash
//! # Start the server on the configured bind address
//! cqa serve --config ./config/cortexqa.toml
//!
//! # One-shot: parse, index, and answer locally
//! cqa query report.pdf "What was the quarterly revenue?"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cortexqa::config::{self, Config};
use cortexqa::corpus::CorpusManager;
use cortexqa::models::CorpusStatus;
use cortexqa::parse::{MIME_DOCX, MIME_MARKDOWN, MIME_PDF, MIME_TEXT};
use cortexqa::server;
use cortexqa::synthesize::Synthesis;

/// cortexqa — ask questions of your documents, answered with citations.
#[derive(Parser)]
#[command(
    name = "cqa",
    about = "cortexqa — document question answering with citation-grounded answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist, built-in defaults are used: a local
    /// hashed embedder, no network calls.
    #[arg(long, global = true, default_value = "./config/cortexqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// document ingestion and question endpoints.
    Serve,

    /// Ingest a local file and answer a single question against it.
    ///
    /// Runs the whole pipeline in-process and prints the answer with its
    /// citations, or reports that no supporting evidence was found.
    Query {
        /// Path to the document (.pdf, .docx, .txt, .md).
        file: PathBuf,

        /// The question to answer.
        question: String,

        /// Number of passages to retrieve (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },
}

/// Maps a file extension to the media type the parser expects.
fn media_type_for(path: &Path) -> anyhow::Result<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => Ok(MIME_PDF),
        Some("docx") => Ok(MIME_DOCX),
        Some("md") | Some("markdown") => Ok(MIME_MARKDOWN),
        Some("txt") | None => Ok(MIME_TEXT),
        Some(other) => bail!("unsupported file extension: .{}", other),
    }
}

async fn run_query(
    cfg: Config,
    file: PathBuf,
    question: String,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let media_type = media_type_for(&file)?;
    let bytes = std::fs::read(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string());

    let manager = Arc::new(CorpusManager::new(Arc::new(cfg)));
    let handle = manager.ingest(bytes, media_type.to_string(), name)?;

    let report = manager
        .wait_until_settled(handle)
        .await
        .context("corpus disappeared while indexing")?;
    if report.status == CorpusStatus::Failed {
        bail!(
            "ingestion failed: {}",
            report.reason.unwrap_or_else(|| "unknown".to_string())
        );
    }
    println!(
        "Indexed {} passages from {}",
        report.passage_count.unwrap_or(0),
        file.display()
    );

    match manager.ask(handle, &question, top_k).await? {
        Synthesis::Answer(answer) => {
            println!("\n{}\n", answer.text);
            println!("Citations:");
            for c in &answer.citations {
                println!("  [passage {} · page {}] {}", c.seq, c.page, c.excerpt);
            }
        }
        Synthesis::NoEvidence => {
            println!("\nNo supporting evidence found in the document for that question.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::builtin()
    };

    match cli.command {
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Query {
            file,
            question,
            top_k,
        } => {
            run_query(cfg, file, question, top_k).await?;
        }
    }

    Ok(())
}
