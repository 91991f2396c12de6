//! Document chunking.
//!
//! Splits document text into an ordered sequence of bounded chunks. Two
//! policies implement the [`Chunker`] trait:
//!
//! - **[`WordChunker`]**: groups whitespace-delimited words, at most
//!   `max_words` per chunk. Pure and deterministic.
//! - **[`TokenChunker`]**: asks the embedding model's tokenizer to split the
//!   text into tokens, then detokenizes fixed-size token windows. The
//!   tokenizer's segmentation is authoritative.
//!
//! Chunk identity is positional: the index in the returned `Vec`. The final
//! partial chunk is always kept, and no chunk is empty.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::{ChunkStrategy, ChunkingConfig};
use crate::embedding::{Tokenizer, DETOKENIZE_ENDPOINT, TOKENIZE_ENDPOINT};
use crate::error::{RagError, Result};

/// A chunking policy.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Maximum units (words or tokens) per chunk.
    fn max_units(&self) -> usize;

    /// Split `text` into chunks in document order.
    async fn chunk(&self, text: &str) -> Result<Vec<String>>;
}

/// Split text into chunks of at most `max_words` whitespace-delimited words.
///
/// Words inside a chunk are joined with a single space, so runs of
/// whitespace and newlines are normalized. Empty or blank text yields no
/// chunks.
pub fn chunk_words(text: &str, max_words: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    words.chunks(max_words).map(|w| w.join(" ")).collect()
}

/// Word-count chunking policy.
#[derive(Debug, Clone)]
pub struct WordChunker {
    max_words: usize,
}

impl WordChunker {
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words: max_words.max(1),
        }
    }
}

#[async_trait]
impl Chunker for WordChunker {
    fn max_units(&self) -> usize {
        self.max_words
    }

    async fn chunk(&self, text: &str) -> Result<Vec<String>> {
        Ok(chunk_words(text, self.max_words))
    }
}

/// Token-count chunking policy backed by a [`Tokenizer`].
pub struct TokenChunker {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
}

impl TokenChunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize) -> Self {
        Self {
            tokenizer,
            max_tokens: max_tokens.max(1),
        }
    }
}

#[async_trait]
impl Chunker for TokenChunker {
    fn max_units(&self) -> usize {
        self.max_tokens
    }

    async fn chunk(&self, text: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self.tokenizer.tokenize(text).await?;
        if tokens.is_empty() {
            return Err(RagError::empty(
                TOKENIZE_ENDPOINT,
                "tokenizer returned no tokens for non-blank text",
            ));
        }
        let mut chunks = Vec::with_capacity(tokens.len() / self.max_tokens + 1);

        for (index, window) in tokens.chunks(self.max_tokens).enumerate() {
            let piece = self.tokenizer.detokenize(window).await?;
            if piece.is_empty() {
                return Err(RagError::empty(
                    DETOKENIZE_ENDPOINT,
                    format!("token window {} decoded to no text", index),
                ));
            }
            // A window of pure whitespace tokens carries nothing to embed.
            if !piece.trim().is_empty() {
                chunks.push(piece);
            }
        }

        Ok(chunks)
    }
}

/// Build the chunker selected by configuration.
pub fn create_chunker(config: &ChunkingConfig, tokenizer: Arc<dyn Tokenizer>) -> Arc<dyn Chunker> {
    match config.strategy {
        ChunkStrategy::Words => Arc::new(WordChunker::new(config.max_units)),
        ChunkStrategy::Tokens => Arc::new(TokenChunker::new(tokenizer, config.max_units)),
    }
}

/// Read a document from disk and chunk it.
///
/// Fails with [`RagError::Io`] if the file cannot be read or is not valid
/// UTF-8.
pub async fn read_chunks(path: &Path, chunker: &dyn Chunker) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RagError::io(path, e))?;
    let text = String::from_utf8(bytes).map_err(|e| {
        RagError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;
    chunker.chunk(&text).await
}
