//! Store overview for `ccrag list`.
//!
//! Lists what is embedded so the corpus owner can check coverage after an
//! ingestion run, and flags records from a model other than the configured
//! one before a query trips over them.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::models::EmbeddingRecord;
use crate::store::{FsStore, Store};

/// Aggregate counts over a set of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    /// Documents per embedding model; unnamed models are keyed `"unknown"`.
    pub models: BTreeMap<String, usize>,
    /// Distinct vector dimensionalities seen.
    pub dims: Vec<usize>,
}

pub fn summarize(records: &[EmbeddingRecord]) -> StoreStats {
    let mut stats = StoreStats::default();
    for record in records {
        stats.documents += 1;
        stats.chunks += record.embeddings.len();
        let model = record.model.clone().unwrap_or_else(|| "unknown".to_string());
        *stats.models.entry(model).or_insert(0) += 1;
        if let Some(d) = record.dims() {
            if !stats.dims.contains(&d) {
                stats.dims.push(d);
            }
        }
    }
    stats.dims.sort_unstable();
    stats
}

/// Print every stored record and a summary.
pub async fn run_list(config: &Config) -> Result<()> {
    let store = FsStore::new(&config.store.dir);
    let records = store.list_all().await?;

    for record in &records {
        println!(
            "{}\tchunks={}\tchunk_size={}\tmodel={}",
            record.source,
            record.embeddings.len(),
            record.chunk_size,
            record.model.as_deref().unwrap_or("unknown")
        );
    }

    let stats = summarize(&records);
    println!();
    println!("  store:     {}", store.dir().display());
    println!("  documents: {}", stats.documents);
    println!("  chunks:    {}", stats.chunks);
    for (model, count) in &stats.models {
        let marker = if model == &config.embedding.model || model == "unknown" {
            ""
        } else {
            "  (differs from configured model)"
        };
        println!("  model {}: {}{}", model, count, marker);
    }
    if stats.dims.len() > 1 {
        println!("  warning: mixed vector dimensions {:?}", stats.dims);
    }
    Ok(())
}
