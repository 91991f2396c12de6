//! Error taxonomy for the retrieval pipeline.
//!
//! Library code returns [`RagError`] so callers can tell a failing
//! embedding service apart from a corrupt store file or a source document
//! that disappeared after indexing. The CLI wraps these in `anyhow`.
//!
//! | Variant | Scope | Handling |
//! |---------|-------|----------|
//! | [`Transport`](RagError::Transport) | one service call | abandon the document / query |
//! | [`EmptyResult`](RagError::EmptyResult) | one service call | same as `Transport` |
//! | [`CorruptRecord`](RagError::CorruptRecord) | one store file | skipped during scans |
//! | [`DimensionMismatch`](RagError::DimensionMismatch) | whole query | fatal |
//! | [`ModelMismatch`](RagError::ModelMismatch) | whole query | fatal |
//! | [`SourceUnavailable`](RagError::SourceUnavailable) | whole query | fatal |

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// The service was unreachable, timed out, or answered with a
    /// non-success status.
    #[error("{endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// The service answered successfully but returned nothing usable.
    #[error("{endpoint}: empty result ({message})")]
    EmptyResult { endpoint: String, message: String },

    #[error("corrupt embedding record {}: {message}", path.display())]
    CorruptRecord { path: PathBuf, message: String },

    #[error(
        "embedding dimension mismatch for {document}: query has {expected} components, \
         stored vector has {found} (was the store built with another model?)"
    )]
    DimensionMismatch {
        document: String,
        expected: usize,
        found: usize,
    },

    #[error("record for {document} was embedded with '{found}', but '{expected}' is configured")]
    ModelMismatch {
        document: String,
        expected: String,
        found: String,
    },

    /// A ranked document could not be read back for context assembly.
    #[error("source unavailable: {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document contains nothing to embed.
    #[error("{}: no content to embed", path.display())]
    EmptyDocument { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The ingestion worker limiter stopped handing out permits.
    #[error("ingestion worker pool closed")]
    PoolClosed(#[from] tokio::sync::AcquireError),
}

impl RagError {
    pub(crate) fn transport(endpoint: &str, message: impl Into<String>) -> Self {
        RagError::Transport {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn empty(endpoint: &str, message: impl Into<String>) -> Self {
        RagError::EmptyResult {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures of the remote embedding/generation service.
    ///
    /// Transport failures and empty results are handled the same way:
    /// the enclosing unit of work is abandoned and can be retried later.
    pub fn is_service_error(&self) -> bool {
        matches!(
            self,
            RagError::Transport { .. } | RagError::EmptyResult { .. }
        )
    }
}
