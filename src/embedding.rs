//! Embedding and generation service boundary.
//!
//! The pipeline consumes three small traits so it can be driven by any
//! backend (and by in-process mocks in tests):
//! - **[`EmbeddingClient`]**: text in, one fixed-length vector per input out.
//! - **[`Generator`]**: prompt in, complete answer text out (no streaming).
//! - **[`Tokenizer`]**: model tokenization, used by the token chunking policy.
//!
//! [`OllamaClient`] implements all three against an Ollama server:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | embed | `POST /api/embed` |
//! | generate | `POST /api/generate` |
//! | tokenize | `POST /api/tokenize` |
//! | detokenize | `POST /api/detokenize` |
//!
//! # Retry Strategy
//!
//! - Network errors (including timeouts), HTTP 429 and 5xx → retry
//! - Other HTTP 4xx → fail immediately
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every failure surfaces as [`RagError::Transport`]; a successful response
//! that carries no vectors or no text is [`RagError::EmptyResult`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::{RagError, Result};

const EMBED_ENDPOINT: &str = "/api/embed";
const GENERATE_ENDPOINT: &str = "/api/generate";
pub(crate) const TOKENIZE_ENDPOINT: &str = "/api/tokenize";
pub(crate) const DETOKENIZE_ENDPOINT: &str = "/api/detokenize";

/// Turns text into embedding vectors for one configured model.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Returns the embedding model identifier (e.g. `"mxbai-embed-large"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::empty(EMBED_ENDPOINT, "no embedding returned for input"))
    }
}

/// Produces an answer for an assembled prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Model-specific tokenization.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    async fn tokenize(&self, text: &str) -> Result<Vec<i64>>;
    async fn detokenize(&self, tokens: &[i64]) -> Result<String>;
}

// ============ Wire types ============

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    total_duration: Option<i64>,
    #[serde(default)]
    load_duration: Option<i64>,
    #[serde(default)]
    prompt_eval_count: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    total_duration: Option<i64>,
    #[serde(default)]
    eval_count: Option<i64>,
}

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    model: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    #[serde(default)]
    tokens: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct DetokenizeRequest<'a> {
    model: &'a str,
    tokens: &'a [i64],
}

#[derive(Debug, Deserialize)]
struct DetokenizeResponse {
    #[serde(default)]
    content: String,
}

// ============ Ollama client ============

/// HTTP client for a local (or remote) Ollama server.
///
/// One `reqwest::Client` is shared by every call, with the configured
/// timeout applied per request. A timed-out call is a transport failure,
/// never a process abort.
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    embed_model: String,
    generation_model: String,
    batch_size: usize,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.service.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.service.url.trim_end_matches('/').to_string(),
            embed_model: config.embedding.model.clone(),
            generation_model: config.generation.model.clone(),
            batch_size: config.embedding.batch_size.max(1),
            max_retries: config.service.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(%url, attempt, ?delay, "retrying request");
                tokio::time::sleep(delay).await;
            }

            match self.client.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            RagError::transport(endpoint, format!("invalid response body: {}", e))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = RagError::transport(
                        endpoint,
                        format!("request failed with status {}: {}", status, body_text.trim()),
                    );

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let kind = if e.is_timeout() { "timed out" } else { "failed" };
                    last_err = Some(RagError::transport(
                        endpoint,
                        format!("request to {} {} (is Ollama running?): {}", url, kind, e),
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RagError::transport(endpoint, "request failed after retries")))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embed_model,
            input: batch,
        };
        let response: EmbedResponse = self.post_json(EMBED_ENDPOINT, &request).await?;
        tracing::debug!(
            model = %response.model,
            inputs = batch.len(),
            total_duration = ?response.total_duration,
            load_duration = ?response.load_duration,
            prompt_eval_count = ?response.prompt_eval_count,
            "embedding batch finished"
        );
        check_embeddings(batch.len(), response.embeddings)
    }
}

/// Reject responses that do not carry exactly one non-empty vector per input.
fn check_embeddings(expected: usize, embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if embeddings.len() != expected {
        return Err(RagError::empty(
            EMBED_ENDPOINT,
            format!("expected {} embeddings, got {}", expected, embeddings.len()),
        ));
    }
    if embeddings.iter().any(Vec::is_empty) {
        return Err(RagError::empty(EMBED_ENDPOINT, "response contained an empty vector"));
    }
    Ok(embeddings)
}

#[async_trait]
impl EmbeddingClient for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Generator for OllamaClient {
    fn model_name(&self) -> &str {
        &self.generation_model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream: false,
        };
        let response: GenerateResponse = self.post_json(GENERATE_ENDPOINT, &request).await?;
        tracing::debug!(
            model = %response.model,
            done = response.done,
            done_reason = ?response.done_reason,
            eval_count = ?response.eval_count,
            total_duration = ?response.total_duration,
            "generation finished"
        );
        if response.response.trim().is_empty() {
            return Err(RagError::empty(GENERATE_ENDPOINT, "model returned no text"));
        }
        Ok(response.response)
    }
}

#[async_trait]
impl Tokenizer for OllamaClient {
    async fn tokenize(&self, text: &str) -> Result<Vec<i64>> {
        let request = TokenizeRequest {
            model: &self.embed_model,
            content: text,
        };
        let response: TokenizeResponse = self.post_json(TOKENIZE_ENDPOINT, &request).await?;
        if response.tokens.is_empty() && !text.trim().is_empty() {
            return Err(RagError::empty(TOKENIZE_ENDPOINT, "no tokens returned for non-blank text"));
        }
        Ok(response.tokens)
    }

    async fn detokenize(&self, tokens: &[i64]) -> Result<String> {
        let request = DetokenizeRequest {
            model: &self.embed_model,
            tokens,
        };
        let response: DetokenizeResponse = self.post_json(DETOKENIZE_ENDPOINT, &request).await?;
        if response.content.is_empty() && !tokens.is_empty() {
            return Err(RagError::empty(
                DETOKENIZE_ENDPOINT,
                format!("no text returned for {} tokens", tokens.len()),
            ));
        }
        Ok(response.content)
    }
}
