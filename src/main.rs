//! # ccrag CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ccrag ingest` | Embed documents listed on stdin (or found with `--dir`) |
//! | `ccrag query "<text>"` | Answer a question using the most similar documents |
//! | `ccrag query "<text>" -s` | Print the most similar documents only |
//! | `ccrag list` | Show stored embedding records |
//!
//! ## Examples
//!
//! ```bash
//! find ~/org -name '*.org' | ccrag ingest
//! ccrag ingest --dir ~/notes
//! ccrag query "what did I decide about the backup rotation?"
//! ccrag query "backup rotation" --similarity-only --scores --limit 3
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ccrag::{config, ingest, query, stats};

/// Local semantic search and question answering over your notes.
#[derive(Parser)]
#[command(
    name = "ccrag",
    about = "Local semantic retrieval over a personal note collection",
    version,
    long_about = "ccrag chunks documents, embeds them with an Ollama model, stores one vector \
    record per document, and ranks stored documents by cosine similarity to a query. Matches \
    are printed or passed to a generation model as context."
)]
struct Cli {
    /// Path to a configuration file (TOML).
    ///
    /// Defaults to `~/.ccrag/config.toml` when present. `CCRAG_*`
    /// environment variables override file values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (debug level). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed documents and store their vectors.
    ///
    /// Reads a newline-delimited list of document paths from stdin.
    /// Documents that already have a record are skipped.
    Ingest {
        /// Walk this directory for documents matching `[ingest]` globs
        /// instead of reading stdin.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Also read paths from stdin when `--dir` is given.
        #[arg(long)]
        stdin: bool,
    },

    /// Search stored documents and answer a question.
    Query {
        /// The question or search text.
        query: String,

        /// Print ranked document paths and stop; skip generation.
        #[arg(short, long)]
        similarity_only: bool,

        /// Print scores alongside document paths.
        #[arg(long)]
        scores: bool,

        /// Maximum number of documents to retrieve (overrides `max_results`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List stored embedding records.
    List,
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "ccrag=debug" } else { "ccrag=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(cli.config.as_deref(), std::env::vars())?;
    tracing::debug!(
        store = %cfg.store.dir.display(),
        url = %cfg.service.url,
        embed_model = %cfg.embedding.model,
        llm_model = %cfg.generation.model,
        chunking = ?cfg.chunking.strategy,
        max_units = cfg.chunking.max_units,
        max_results = cfg.retrieval.max_results,
        "effective configuration"
    );

    match cli.command {
        Commands::Ingest { dir, stdin } => {
            let report = ingest::run_ingest(&cfg, dir, stdin).await?;
            if !report.failed.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Query {
            query: text,
            similarity_only,
            scores,
            limit,
        } => {
            query::run_query(&cfg, &text, similarity_only, scores, limit).await?;
        }
        Commands::List => {
            stats::run_list(&cfg).await?;
        }
    }

    Ok(())
}
