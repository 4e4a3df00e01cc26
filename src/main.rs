//! # DocQA CLI (`docqa`)
//!
//! The `docqa` binary drives the document question-answering pipeline from
//! the command line and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ingest <file>` | Index a PDF/DOCX, replacing the active corpus |
//! | `docqa ask "<query>"` | Answer a one-shot question from the corpus |
//! | `docqa grammar "<text>"` | Analyze the grammar of a piece of text |
//! | `docqa serve` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docqa::config;
use docqa::corpus::ActiveCorpus;
use docqa::embedding::{create_embedder, Embedder};
use docqa::engine::QueryEngine;
use docqa::generation::{create_generator, Generator};
use docqa::grammar;
use docqa::server;

/// DocQA — grounded question answering over a single uploaded document.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "DocQA — grounded question answering over a single uploaded document",
    version,
    long_about = "DocQA ingests one PDF or DOCX document, indexes it as embedded text chunks \
    in SQLite, and answers questions grounded in the retrieved chunks, with page-level source \
    attribution and a fixed refusal when the document does not contain the answer."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. Chunking, retrieval, provider, and
    /// server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index a document, replacing the active corpus.
    ///
    /// Extracts page-level text from the PDF or DOCX, chunks and embeds it,
    /// builds a fresh index at a staging path, and atomically swaps it in.
    /// The previous corpus stays queryable until the swap and is discarded
    /// afterwards.
    Ingest {
        /// Path to the `.pdf` or `.docx` file.
        file: PathBuf,
    },

    /// Answer a one-shot question from the active corpus.
    ///
    /// Embeds the query, retrieves the most similar chunks, and prints the
    /// grounded answer with its sources. Without an ingested document the
    /// answer is the fixed refusal sentence.
    Ask {
        /// The question to answer.
        query: String,
    },

    /// Analyze the grammar of a piece of text.
    ///
    /// Sends the text to the generation provider with a fixed analysis
    /// instruction. Does not touch the corpus.
    Grammar {
        /// The text to analyze.
        text: String,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// upload, chat, grammar, and health endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { file } => {
            let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&cfg.embedding)?);
            let corpus = ActiveCorpus::load_or_create(&cfg, embedder).await?;
            let report = corpus.ingest(&file).await?;
            println!(
                "Indexed {} ({} chunks). Previous corpus replaced.",
                report.file_name, report.chunk_count
            );
        }
        Commands::Ask { query } => {
            let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&cfg.embedding)?);
            let generator: Arc<dyn Generator> = Arc::from(create_generator(&cfg.generation)?);
            let corpus = Arc::new(ActiveCorpus::load_or_create(&cfg, embedder.clone()).await?);
            let engine = QueryEngine::new(corpus, embedder, generator, &cfg);

            let result = engine.ask(&query, &[]).await?;
            println!("{}", result.answer);
            if !result.sources.is_empty() {
                let mut sources: Vec<String> = result.sources.into_iter().collect();
                sources.sort();
                println!("\nSumber: {}", sources.join(", "));
            }
        }
        Commands::Grammar { text } => {
            let generator = create_generator(&cfg.generation)?;
            let analysis = grammar::analyze(generator.as_ref(), &text).await?;
            println!("{}", analysis);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
