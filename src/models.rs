//! Core data models that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted unit: every chunk vector for one document.
///
/// Serialized as one JSON file per document. `embeddings`, `chunk_size`
/// and `source` are required; `model` and `created_at` are optional so
/// records written without them still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// One vector per chunk, in document order.
    pub embeddings: Vec<Vec<f32>>,
    /// Chunking unit count in effect when the record was created.
    pub chunk_size: usize,
    /// Document identifier (the source path).
    pub source: String,
    /// Embedding model that produced the vectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl EmbeddingRecord {
    pub fn new(source: &str, embeddings: Vec<Vec<f32>>, chunk_size: usize, model: &str) -> Self {
        Self {
            embeddings,
            chunk_size,
            source: source.to_string(),
            model: Some(model.to_string()),
            created_at: Some(Utc::now()),
        }
    }

    /// Dimensionality of the first chunk vector, if any.
    pub fn dims(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }
}

/// A document and its aggregate similarity to a query. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    pub document_id: String,
    pub score: f64,
}

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Documents embedded and written in this run.
    pub embedded: Vec<String>,
    /// Documents that already had a record.
    pub skipped: Vec<String>,
    /// Abandoned documents with the reason, in input order.
    pub failed: Vec<(String, String)>,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.embedded.len() + self.skipped.len() + self.failed.len()
    }
}
