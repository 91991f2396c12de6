//! Retrieval and ranking.
//!
//! Scores every stored document against a query vector with a full linear
//! scan; there is no index. The ranker is stateless and never mutates its
//! inputs.
//!
//! # Scoring Algorithm
//!
//! 1. Reject the scan if any stored vector's length differs from the query's
//!    ([`check_dimensions`]). Mixed-model corpora fail loudly instead of
//!    producing misleading rankings.
//! 2. Per chunk: cosine similarity with the query, accumulated in `f64`.
//! 3. Per document: arithmetic **mean** of its chunk similarities.
//! 4. Sort by score (desc), then document id (asc) for ties.
//! 5. Truncate to `k`.
//!
//! ```text
//!            q · v
//! cos(θ) = ─────────
//!          ‖q‖ × ‖v‖
//! ```

use std::cmp::Ordering;

use crate::error::{RagError, Result};
use crate::models::{EmbeddingRecord, ScoredResult};

/// Cosine similarity between two vectors of equal length.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` when either vector has zero
/// magnitude. Lengths must already be validated by [`check_dimensions`].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "cosine_similarity on unequal lengths");

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Mean cosine similarity of `query` against every chunk of `record`.
///
/// A record without vectors scores `0.0`; callers filter those out first.
pub fn document_score(query: &[f32], record: &EmbeddingRecord) -> f64 {
    if record.embeddings.is_empty() {
        return 0.0;
    }
    let total: f64 = record
        .embeddings
        .iter()
        .map(|v| cosine_similarity(query, v))
        .sum();
    total / record.embeddings.len() as f64
}

/// Verify every chunk vector has the query's dimensionality.
pub fn check_dimensions(query: &[f32], records: &[EmbeddingRecord]) -> Result<()> {
    for record in records {
        if let Some(v) = record.embeddings.iter().find(|v| v.len() != query.len()) {
            return Err(RagError::DimensionMismatch {
                document: record.source.clone(),
                expected: query.len(),
                found: v.len(),
            });
        }
    }
    Ok(())
}

/// Verify no record was produced by a model other than `model`.
///
/// Records that do not name their model are accepted; the dimension check
/// still guards them.
pub fn check_models(model: &str, records: &[EmbeddingRecord]) -> Result<()> {
    for record in records {
        if let Some(found) = record.model.as_deref() {
            if found != model {
                return Err(RagError::ModelMismatch {
                    document: record.source.clone(),
                    expected: model.to_string(),
                    found: found.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Descending score, NaN last, then ascending document id.
fn compare_results(a: &ScoredResult, b: &ScoredResult) -> Ordering {
    let by_score = match (a.score.is_nan(), b.score.is_nan()) {
        (false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    };
    by_score.then_with(|| a.document_id.cmp(&b.document_id))
}

/// Rank `records` against `query` and return the top `k`.
///
/// Returns `min(k, eligible records)` results; an empty corpus yields an
/// empty list. Records without vectors are skipped.
pub fn rank(query: &[f32], records: &[EmbeddingRecord], k: usize) -> Result<Vec<ScoredResult>> {
    check_dimensions(query, records)?;

    let mut scored: Vec<ScoredResult> = records
        .iter()
        .filter(|r| {
            if r.embeddings.is_empty() {
                tracing::warn!(document = %r.source, "skipping record with no embeddings");
                false
            } else {
                true
            }
        })
        .map(|r| {
            let score = document_score(query, r);
            tracing::debug!(document = %r.source, chunks = r.embeddings.len(), score, "scored");
            ScoredResult {
                document_id: r.source.clone(),
                score,
            }
        })
        .collect();

    scored.sort_by(compare_results);
    scored.truncate(k);
    Ok(scored)
}
