//! Ingestion pipeline orchestration.
//!
//! Turns document paths into stored embedding records:
//! existence check → read + chunk → embed → store.
//!
//! Documents are independent, so they run concurrently on a worker pool
//! bounded by a semaphore (`ingest.workers`, default 4) to avoid flooding
//! the embedding service. Each document is its own unit of failure: a
//! failing or panicking document is reported and the rest of the batch
//! continues. Nothing is written for a failed document, so re-running
//! ingestion retries exactly the documents that are still missing.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use walkdir::WalkDir;

use crate::chunk::{create_chunker, read_chunks, Chunker};
use crate::config::{Config, IngestConfig};
use crate::embedding::{EmbeddingClient, OllamaClient};
use crate::error::RagError;
use crate::models::{EmbeddingRecord, IngestReport};
use crate::store::{FsStore, Store};

/// What happened to a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// A record with this many chunk vectors was written.
    Embedded { chunks: usize },
    /// A record already existed.
    Skipped,
}

/// Chunk, embed and store one document.
///
/// Presence of a record is the only freshness check: an existing record is
/// never rewritten, regardless of changes to the source file.
pub async fn embed_document(
    document_id: &str,
    chunker: &dyn Chunker,
    embedder: &dyn EmbeddingClient,
    store: &dyn Store,
) -> crate::error::Result<DocumentOutcome> {
    if store.has(document_id).await? {
        return Ok(DocumentOutcome::Skipped);
    }

    let path = Path::new(document_id);
    let chunks = read_chunks(path, chunker).await?;
    if chunks.is_empty() {
        return Err(RagError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }

    let vectors = embedder.embed_texts(&chunks).await?;
    if vectors.len() != chunks.len() || vectors.iter().any(Vec::is_empty) {
        return Err(RagError::EmptyResult {
            endpoint: "embed".to_string(),
            message: format!(
                "{} chunks produced {} usable vectors",
                chunks.len(),
                vectors.iter().filter(|v| !v.is_empty()).count()
            ),
        });
    }

    let record = EmbeddingRecord::new(
        document_id,
        vectors,
        chunker.max_units(),
        embedder.model_name(),
    );
    store.put(document_id, &record).await?;

    Ok(DocumentOutcome::Embedded {
        chunks: record.embeddings.len(),
    })
}

/// Ingest `paths` with at most `workers` documents in flight.
///
/// Duplicate paths are processed once. The report lists documents in input
/// order; completion order is not observable.
pub async fn ingest_paths(
    paths: Vec<String>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn Store>,
    workers: usize,
) -> IngestReport {
    let limiter = Arc::new(Semaphore::new(workers.max(1)));
    let mut seen = HashSet::new();
    let mut handles = Vec::new();

    for path in paths {
        if !seen.insert(path.clone()) {
            continue;
        }

        let limiter = limiter.clone();
        let chunker = chunker.clone();
        let embedder = embedder.clone();
        let store = store.clone();
        let id = path.clone();

        let handle = tokio::spawn(async move {
            let _permit = limiter.acquire_owned().await?;
            tracing::debug!(document = %id, "embedding");
            embed_document(&id, chunker.as_ref(), embedder.as_ref(), store.as_ref()).await
        });
        handles.push((path, handle));
    }

    let mut report = IngestReport::default();
    for (path, handle) in handles {
        match handle.await {
            Ok(Ok(DocumentOutcome::Embedded { chunks })) => {
                tracing::info!(document = %path, chunks, "embedded");
                report.embedded.push(path);
            }
            Ok(Ok(DocumentOutcome::Skipped)) => {
                tracing::debug!(document = %path, "already embedded, skipping");
                report.skipped.push(path);
            }
            Ok(Err(e)) => {
                tracing::warn!(document = %path, error = %e, "failed to embed document");
                report.failed.push((path, e.to_string()));
            }
            Err(e) => {
                tracing::error!(document = %path, error = %e, "ingestion worker panicked");
                report.failed.push((path, format!("worker failed: {}", e)));
            }
        }
    }

    report
}

/// Parse a newline-delimited path list, dropping blank lines.
pub fn parse_path_list(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Walk `root` and return files matching the include/exclude globs, sorted.
pub fn scan_directory(root: &Path, ingest: &IngestConfig) -> Result<Vec<String>> {
    if !root.is_dir() {
        anyhow::bail!("Ingest directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&ingest.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(ingest.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) || !include_set.is_match(relative) {
            continue;
        }
        paths.push(path.to_string_lossy().to_string());
    }

    paths.sort();
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Run the `ingest` command: collect paths, embed them, print a summary.
pub async fn run_ingest(config: &Config, dir: Option<PathBuf>, read_stdin: bool) -> Result<IngestReport> {
    let mut paths = Vec::new();
    if let Some(ref dir) = dir {
        paths.extend(scan_directory(dir, &config.ingest)?);
    }
    if read_stdin || dir.is_none() {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("Failed to read document list from stdin")?;
        paths.extend(parse_path_list(&input));
    }

    let store = FsStore::new(&config.store.dir);
    store.ensure_dir().await?;

    let client = Arc::new(OllamaClient::new(config)?);
    let chunker = create_chunker(&config.chunking, client.clone());

    tracing::debug!(
        store = %store.dir().display(),
        documents = paths.len(),
        workers = config.ingest.workers,
        "starting ingestion"
    );

    let report = ingest_paths(
        paths,
        chunker,
        client,
        Arc::new(store),
        config.ingest.workers,
    )
    .await;

    println!("ingest");
    println!("  documents: {}", report.total());
    println!("  embedded: {}", report.embedded.len());
    println!("  skipped (already embedded): {}", report.skipped.len());
    println!("  failed: {}", report.failed.len());
    for (path, reason) in &report.failed {
        println!("    {}: {}", path, reason);
    }

    Ok(report)
}
