//! End-to-end ingestion and retrieval against a filesystem store.
//!
//! The model service is replaced with deterministic in-process fakes, so
//! these tests exercise chunking, record storage, ranking and context
//! assembly together without a running Ollama.

use async_trait::async_trait;
use ccrag::chunk::WordChunker;
use ccrag::embedding::{EmbeddingClient, Generator};
use ccrag::error::{RagError, Result};
use ccrag::ingest::ingest_paths;
use ccrag::models::EmbeddingRecord;
use ccrag::query::{answer, similarity_search};
use ccrag::store::{FsStore, Store};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const MODEL: &str = "fake-embed";

/// "cat" text points along x, "dog" text along y.
struct AxisEmbedder;

#[async_trait]
impl EmbeddingClient for AxisEmbedder {
    fn model_name(&self) -> &str {
        MODEL
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                if t.contains("cat") {
                    vec![1.0, 0.0]
                } else if t.contains("dog") {
                    vec![0.0, 1.0]
                } else {
                    vec![0.6, 0.8]
                }
            })
            .collect())
    }
}

/// Records the prompt it was given and answers with a fixed string.
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "fake-llm"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("It sat.".to_string())
    }
}

/// Collects formatted log output written by the subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

/// Route warnings on this thread into a buffer until the guard drops.
fn capture_warnings() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

fn write(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().to_string()
}

struct Fixture {
    tmp: TempDir,
    store: Arc<FsStore>,
    alice: String,
    bob: String,
}

async fn ingested_fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let alice = write(tmp.path(), "alice.txt", "the cat sat");
    let bob = write(tmp.path(), "bob.txt", "the dog ran");
    let store = Arc::new(FsStore::new(tmp.path().join("embed")));
    store.ensure_dir().await.unwrap();

    let report = ingest_paths(
        vec![alice.clone(), bob.clone()],
        Arc::new(WordChunker::new(100)),
        Arc::new(AxisEmbedder),
        store.clone(),
        4,
    )
    .await;
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.embedded, vec![alice.clone(), bob.clone()]);

    Fixture {
        tmp,
        store,
        alice,
        bob,
    }
}

#[tokio::test]
async fn test_ranks_matching_document_first() {
    let fx = ingested_fixture().await;

    let ranked = similarity_search(&AxisEmbedder, fx.store.as_ref(), "cat", 10)
        .await
        .unwrap();

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].document_id, fx.alice);
    assert!((ranked[0].score - 1.0).abs() < 1e-6);
    assert_eq!(ranked[1].document_id, fx.bob);
    assert!(ranked[1].score.abs() < 1e-6);
}

#[tokio::test]
async fn test_k_limits_results() {
    let fx = ingested_fixture().await;
    let ranked = similarity_search(&AxisEmbedder, fx.store.as_ref(), "dog", 1)
        .await
        .unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].document_id, fx.bob);
}

#[tokio::test]
async fn test_empty_store_yields_no_results() {
    let tmp = TempDir::new().unwrap();
    let store = FsStore::new(tmp.path().join("embed"));
    let ranked = similarity_search(&AxisEmbedder, &store, "cat", 10)
        .await
        .unwrap();
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn test_blank_query_yields_no_results() {
    let fx = ingested_fixture().await;
    let ranked = similarity_search(&AxisEmbedder, fx.store.as_ref(), "   ", 10)
        .await
        .unwrap();
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn test_record_without_vectors_is_ignored() {
    let tmp = TempDir::new().unwrap();
    let store = FsStore::new(tmp.path());

    for i in 0..9 {
        let id = format!("/notes/doc{}.org", i);
        let v = vec![1.0, i as f32];
        store
            .put(&id, &EmbeddingRecord::new(&id, vec![v], 100, MODEL))
            .await
            .unwrap();
    }
    let hollow = "/notes/hollow.org";
    store
        .put(hollow, &EmbeddingRecord::new(hollow, Vec::new(), 100, MODEL))
        .await
        .unwrap();

    let (logs, _guard) = capture_warnings();
    let ranked = similarity_search(&AxisEmbedder, &store, "cat", 20)
        .await
        .unwrap();
    assert_eq!(ranked.len(), 9);
    assert!(ranked.iter().all(|r| r.document_id != hollow));
    assert_eq!(ranked[0].document_id, "/notes/doc0.org");

    let logged = logs.contents();
    assert!(logged.contains("WARN"), "{logged}");
    assert!(logged.contains("skipping record with no embeddings"), "{logged}");
    assert_eq!(logged.matches("skipping record").count(), 1, "{logged}");
}

#[tokio::test]
async fn test_corrupt_record_does_not_block_queries() {
    let fx = ingested_fixture().await;
    let garbage = fx.store.dir().join("garbage.json");
    std::fs::write(&garbage, "{ not json").unwrap();

    let (logs, _guard) = capture_warnings();
    let ranked = similarity_search(&AxisEmbedder, fx.store.as_ref(), "cat", 10)
        .await
        .unwrap();
    assert_eq!(ranked.len(), 2);

    let logged = logs.contents();
    assert!(logged.contains("skipping unreadable record"), "{logged}");
    assert!(logged.contains("garbage.json"), "{logged}");
}

#[tokio::test]
async fn test_reingest_leaves_records_untouched() {
    let fx = ingested_fixture().await;
    let record_path = fx.store.record_path(&fx.alice);
    let before = std::fs::read(&record_path).unwrap();

    // The source changes, but an existing record is never rewritten.
    std::fs::write(&fx.alice, "the dog ran away").unwrap();
    let report = ingest_paths(
        vec![fx.alice.clone(), fx.bob.clone()],
        Arc::new(WordChunker::new(100)),
        Arc::new(AxisEmbedder),
        fx.store.clone(),
        2,
    )
    .await;

    assert_eq!(report.skipped, vec![fx.alice.clone(), fx.bob.clone()]);
    assert!(report.embedded.is_empty());
    assert_eq!(std::fs::read(&record_path).unwrap(), before);
}

#[tokio::test]
async fn test_failed_document_retried_on_next_run() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FsStore::new(tmp.path().join("embed")));
    let late = tmp.path().join("late.txt").to_string_lossy().to_string();

    let first = ingest_paths(
        vec![late.clone()],
        Arc::new(WordChunker::new(100)),
        Arc::new(AxisEmbedder),
        store.clone(),
        1,
    )
    .await;
    assert_eq!(first.failed.len(), 1);
    assert!(!store.has(&late).await.unwrap());

    std::fs::write(&late, "a cat appears").unwrap();
    let second = ingest_paths(
        vec![late.clone()],
        Arc::new(WordChunker::new(100)),
        Arc::new(AxisEmbedder),
        store.clone(),
        1,
    )
    .await;
    assert_eq!(second.embedded, vec![late.clone()]);

    let record = store.get(&late).await.unwrap().unwrap();
    assert_eq!(record.source, late);
    assert_eq!(record.model.as_deref(), Some(MODEL));
}

#[tokio::test]
async fn test_answer_uses_ranked_documents_as_context() {
    let fx = ingested_fixture().await;
    let generator = RecordingGenerator::new();

    let reply = answer(&AxisEmbedder, &generator, fx.store.as_ref(), "cat", 2)
        .await
        .unwrap();
    assert_eq!(reply.text, "It sat.");
    assert_eq!(reply.sources.len(), 2);

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    let cat = prompt.find("the cat sat").unwrap();
    let dog = prompt.find("the dog ran").unwrap();
    assert!(cat < dog, "context must follow rank order");
    assert!(prompt.ends_with("Question: cat"));
}

#[tokio::test]
async fn test_answer_fails_when_source_is_gone() {
    let fx = ingested_fixture().await;
    std::fs::remove_file(&fx.alice).unwrap();

    let generator = RecordingGenerator::new();
    let err = answer(&AxisEmbedder, &generator, fx.store.as_ref(), "cat", 2)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::SourceUnavailable { .. }), "got {err}");
    assert!(generator.prompts.lock().unwrap().is_empty());
    drop(fx.tmp);
}

#[tokio::test]
async fn test_records_from_another_model_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = FsStore::new(tmp.path());
    let id = "/notes/old.org";
    store
        .put(id, &EmbeddingRecord::new(id, vec![vec![1.0, 0.0]], 100, "other-model"))
        .await
        .unwrap();

    let err = similarity_search(&AxisEmbedder, &store, "cat", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::ModelMismatch { .. }), "got {err}");
}

#[tokio::test]
async fn test_dimension_mismatch_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let store = FsStore::new(tmp.path());
    let id = "/notes/wide.org";
    store
        .put(id, &EmbeddingRecord::new(id, vec![vec![1.0, 0.0, 0.0]], 100, MODEL))
        .await
        .unwrap();

    let err = similarity_search(&AxisEmbedder, &store, "cat", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { .. }), "got {err}");
}
