//! Configuration loading.
//!
//! A [`Config`] is built once at startup from an optional TOML file plus
//! `CCRAG_*` environment overrides, then handed to every component. Nothing
//! below `main` reads the environment.
//!
//! ```toml
//! [service]
//! url = "http://localhost:11434"
//! timeout_secs = 180
//!
//! [embedding]
//! model = "mxbai-embed-large"
//!
//! [generation]
//! model = "mistral:latest"
//!
//! [chunking]
//! strategy = "words"   # or "tokens"
//! max_units = 100
//!
//! [retrieval]
//! max_results = 10
//!
//! [store]
//! dir = "~/.ccrag/embed"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_timeout_secs() -> u64 {
    180
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embed_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embed_model(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embed_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_batch_size() -> usize {
    16
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
        }
    }
}

fn default_llm_model() -> String {
    "mistral:latest".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Whitespace-delimited words.
    #[default]
    Words,
    /// Tokens from the service's tokenizer endpoint.
    Tokens,
}

impl std::str::FromStr for ChunkStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "words" => Ok(ChunkStrategy::Words),
            "tokens" => Ok(ChunkStrategy::Tokens),
            other => bail!("Unknown chunking strategy: '{}'. Must be words or tokens.", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,
    #[serde(default = "default_max_units")]
    pub max_units: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            max_units: default_max_units(),
        }
    }
}

fn default_max_units() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    home_dir().join(".ccrag").join("embed")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.org".to_string(),
        "**/*.txt".to_string(),
    ]
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Default location of the optional config file.
pub fn default_config_path() -> PathBuf {
    home_dir().join(".ccrag").join("config.toml")
}

/// Load configuration for the CLI.
///
/// An explicit `path` must exist. Without one, the default config file is
/// read if present. Environment overrides from `env` are applied last,
/// then the result is validated.
pub fn load_config<I>(path: Option<&Path>, env: I) -> Result<Config>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = match path {
        Some(p) => parse_file(p)?,
        None => {
            let p = default_config_path();
            if p.exists() {
                parse_file(&p)?
            } else {
                Config::default()
            }
        }
    };

    apply_env_overrides(&mut config, env)?;
    config.store.dir = expand_home(&config.store.dir);
    validate(&config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

/// Apply `CCRAG_*` overrides. Unrelated keys are ignored.
pub fn apply_env_overrides<I>(config: &mut Config, env: I) -> Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in env {
        match key.as_str() {
            "CCRAG_OLLAMA_ADDRESS" => config.service.url = value,
            "CCRAG_EMBED_MODEL" => config.embedding.model = value,
            "CCRAG_LLM_MODEL" => config.generation.model = value,
            "CCRAG_MAX_RESULTS" => config.retrieval.max_results = parse_number(&key, &value)?,
            "CCRAG_WORDS_PER_CHUNK" => config.chunking.max_units = parse_number(&key, &value)?,
            "CCRAG_CHUNK_STRATEGY" => config.chunking.strategy = value.parse()?,
            "CCRAG_STORE_DIR" => config.store.dir = PathBuf::from(value),
            "CCRAG_WORKERS" => config.ingest.workers = parse_number(&key, &value)?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, value))
}

pub fn validate(config: &Config) -> Result<()> {
    if config.service.url.trim().is_empty() {
        bail!("service.url must not be empty");
    }
    if config.embedding.model.trim().is_empty() {
        bail!("embedding.model must not be empty");
    }
    if config.generation.model.trim().is_empty() {
        bail!("generation.model must not be empty");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.chunking.max_units == 0 {
        bail!("chunking.max_units must be > 0");
    }
    if config.retrieval.max_results < 1 {
        bail!("retrieval.max_results must be >= 1");
    }
    if config.ingest.workers < 1 {
        bail!("ingest.workers must be >= 1");
    }
    Ok(())
}
