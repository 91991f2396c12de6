//! # ccrag
//!
//! Local semantic retrieval over a personal note collection.
//!
//! Documents are split into bounded chunks, each chunk is embedded by an
//! Ollama model, and the vectors are stored as one JSON record per
//! document. A query is embedded the same way and every stored document is
//! ranked by mean cosine similarity; the best matches are either printed or
//! handed to a generation model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌────────────┐
//! │ paths     │──▶│  Chunker  │──▶│  Ollama   │──▶│  FsStore   │
//! │ (stdin)   │   │ words/tok │   │  /embed   │   │ JSON files │
//! └───────────┘   └───────────┘   └───────────┘   └─────┬──────┘
//!                                                       │ list_all
//!  query ──embed──▶ vector ──────────────────────▶ ┌────▼─────┐
//!                                                  │   rank   │
//!                                                  └────┬─────┘
//!                          similarity-only ◀────────────┤
//!                                                       ▼
//!                              context → /generate → answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! find ~/notes -name '*.org' | ccrag ingest
//! ccrag query "when is the dentist appointment" --similarity-only
//! ccrag query "summarize my notes on tokio"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Records and results |
//! | [`chunk`] | Word and token chunking |
//! | [`embedding`] | Embedding/generation service boundary |
//! | [`store`] | Embedding record storage |
//! | [`search`] | Cosine scoring and top-k ranking |
//! | [`context`] | Prompt context assembly |
//! | [`ingest`] | Concurrent ingestion |
//! | [`query`] | Similarity search and answering |
//! | [`stats`] | Store overview |

pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod query;
pub mod search;
pub mod stats;
pub mod store;
