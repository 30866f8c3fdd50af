//! # Profile RAG CLI (`prag`)
//!
//! The `prag` binary builds the vector index from a personal knowledge file,
//! queries it, and serves the chat API.
//!
//! ## Usage
//!
//! ```bash
//! prag --config ./config/prag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `prag init` | Create the SQLite index database |
//! | `prag rebuild` | Chunk, embed, and publish a fresh index |
//! | `prag search "<query>"` | Show the chunks retrieved for a query |
//! | `prag ask "<question>"` | Answer a question end to end |
//! | `prag chunks` | Dry run: documents and chunk counts |
//! | `prag summary` | Overview of the knowledge file |
//! | `prag serve` | Start the HTTP chat API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use profile_rag::{commands, config, logging, server};

/// Profile RAG: a retrieval-augmented assistant that answers questions
/// about one person from a structured knowledge file.
#[derive(Parser)]
#[command(
    name = "prag",
    about = "Profile RAG: answer questions about a person from their knowledge file",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/prag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database. Idempotent.
    Init,

    /// Rebuild the index from the knowledge file.
    ///
    /// The previous index keeps serving until the new one is complete;
    /// a failed rebuild leaves it in place.
    Rebuild,

    /// Retrieve the chunks most relevant to a query.
    Search {
        /// The search query.
        query: String,

        /// Number of chunks to return (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a question using retrieval and generation.
    Ask {
        /// The question.
        question: String,
    },

    /// Show documents and chunk counts without embedding.
    Chunks,

    /// Print an overview of the knowledge file.
    Summary,

    /// Start the HTTP chat API on `[server] bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let _log_guard = logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Rebuild => commands::run_rebuild(&cfg).await?,
        Commands::Search { query, k } => commands::run_search(&cfg, &query, k).await?,
        Commands::Ask { question } => commands::run_ask(&cfg, &question).await?,
        Commands::Chunks => commands::run_chunks(&cfg)?,
        Commands::Summary => commands::run_summary(&cfg)?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
