//! Query workflow.
//!
//! Two modes share the retrieval half:
//!
//! ```text
//! query ──embed──▶ query vector ──rank over store──▶ top-k documents
//!                                                     │
//!                      similarity-only: print ◀───────┤
//!                                                     ▼
//!                         full: read sources → prompt → generate → answer
//! ```
//!
//! A query is one unit of work: any failure along the way is returned to
//! the caller as a single error.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::context::{assemble_context, build_prompt};
use crate::embedding::{EmbeddingClient, Generator, OllamaClient};
use crate::error::RagError;
use crate::models::ScoredResult;
use crate::search::{check_models, rank};
use crate::store::{FsStore, Store};

/// A generated answer and the documents it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredResult>,
}

/// Embed `query` and rank every stored document against it.
///
/// A blank query returns no results without calling the service.
pub async fn similarity_search(
    embedder: &dyn EmbeddingClient,
    store: &dyn Store,
    query: &str,
    k: usize,
) -> crate::error::Result<Vec<ScoredResult>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let query_vec = embedder.embed_text(query).await?;
    if query_vec.is_empty() {
        return Err(RagError::EmptyResult {
            endpoint: "embed".to_string(),
            message: "query embedding has no components".to_string(),
        });
    }

    let records = store.list_all().await?;
    check_models(embedder.model_name(), &records)?;
    rank(&query_vec, &records, k)
}

/// Retrieve the top `k` documents and ask the generation model to answer
/// `query` with their text as context.
pub async fn answer(
    embedder: &dyn EmbeddingClient,
    generator: &dyn Generator,
    store: &dyn Store,
    query: &str,
    k: usize,
) -> crate::error::Result<Answer> {
    let sources = similarity_search(embedder, store, query, k).await?;
    let context = assemble_context(&sources).await?;
    let prompt = build_prompt(&context, query);
    tracing::debug!(
        model = generator.model_name(),
        documents = sources.len(),
        prompt_chars = prompt.len(),
        "generating answer"
    );
    let text = generator.generate(&prompt).await?;
    Ok(Answer { text, sources })
}

/// Run the `query` command and print results to stdout.
pub async fn run_query(
    config: &Config,
    query: &str,
    similarity_only: bool,
    show_scores: bool,
    limit: Option<usize>,
) -> Result<()> {
    let k = limit.unwrap_or(config.retrieval.max_results);
    if k == 0 {
        bail!("--limit must be >= 1");
    }
    if !similarity_only && query.trim().is_empty() {
        bail!("Query must not be empty.");
    }

    let client = OllamaClient::new(config)?;
    let store = FsStore::new(&config.store.dir);

    if similarity_only {
        let results = similarity_search(&client, &store, query, k).await?;
        for r in &results {
            if show_scores {
                println!("{:.4}\t{}", r.score, r.document_id);
            } else {
                println!("{}", r.document_id);
            }
        }
        return Ok(());
    }

    let reply = answer(&client, &client, &store, query, k).await?;
    if show_scores {
        for r in &reply.sources {
            eprintln!("{:.4}\t{}", r.score, r.document_id);
        }
    }
    println!("{}", reply.text);
    Ok(())
}
