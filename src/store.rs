//! Embedding storage.
//!
//! The [`Store`] trait is the durable mapping from document identifier to
//! [`EmbeddingRecord`]. Records are created once and never updated:
//! ingestion calls [`has`](Store::has) first and skips documents that
//! already have a record.
//!
//! Two backends:
//! - **[`FsStore`]**: one JSON file per document in a directory. The file
//!   name is derived from the identifier with [`record_file_name`], so
//!   `has` is a single existence check.
//! - **[`InMemoryStore`]**: a `HashMap` behind a `RwLock`, for tests and
//!   embedding the library.
//!
//! Full scans ([`list_all`](Store::list_all)) skip unreadable records and
//! records with no vectors, logging a warning for each, so one bad file
//! never aborts retrieval over the rest of the corpus.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{RagError, Result};
use crate::models::EmbeddingRecord;

const RECORD_EXT: &str = "json";
const MAX_SLUG_LEN: usize = 80;
const HASH_PREFIX_LEN: usize = 12;

/// Abstract storage backend for embedding records.
///
/// Implementations must tolerate concurrent `put` calls for different
/// document identifiers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether a record exists for `document_id`.
    async fn has(&self, document_id: &str) -> Result<bool>;

    /// Persist the record for `document_id`, replacing any existing one.
    async fn put(&self, document_id: &str, record: &EmbeddingRecord) -> Result<()>;

    /// Fetch the record for `document_id`.
    async fn get(&self, document_id: &str) -> Result<Option<EmbeddingRecord>>;

    /// Every usable record, sorted by source identifier.
    async fn list_all(&self) -> Result<Vec<EmbeddingRecord>>;
}

/// Lowercase ASCII slug of an identifier.
///
/// Alphanumerics are kept, every other run of characters becomes a single
/// `-`, and the result is trimmed of dashes and capped in length.
pub fn slugify(id: &str) -> String {
    let mut slug = String::with_capacity(id.len());
    let mut pending_dash = false;

    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

/// Deterministic record file name for a document identifier.
///
/// The readable slug is suffixed with a SHA-256 prefix of the raw
/// identifier, so `notes/a b.txt` and `notes/a-b.txt` never collide.
pub fn record_file_name(document_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    let hash = &hash[..HASH_PREFIX_LEN];

    let slug = slugify(document_id);
    if slug.is_empty() {
        format!("{}.{}", hash, RECORD_EXT)
    } else {
        format!("{}-{}.{}", slug, hash, RECORD_EXT)
    }
}

/// Filesystem store: one JSON file per document.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the store directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RagError::io(&self.dir, e))
    }

    pub fn record_path(&self, document_id: &str) -> PathBuf {
        self.dir.join(record_file_name(document_id))
    }
}

/// Read and parse one record file.
pub async fn load_record(path: &Path) -> Result<EmbeddingRecord> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| RagError::io(path, e))?;
    serde_json::from_slice(&data).map_err(|e| RagError::CorruptRecord {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// A record that cannot be serialized is a failed write, not a corrupt file.
fn encode_error(path: &Path, err: serde_json::Error) -> RagError {
    RagError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

fn is_record_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| !n.starts_with('.'))
        .unwrap_or(false);
    visible && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT)
}

#[async_trait]
impl Store for FsStore {
    async fn has(&self, document_id: &str) -> Result<bool> {
        let path = self.record_path(document_id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| RagError::io(&path, e))
    }

    async fn put(&self, document_id: &str, record: &EmbeddingRecord) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.record_path(document_id);
        let json = serde_json::to_vec(record).map_err(|e| encode_error(&path, e))?;

        // Write a hidden sibling first so scans never see a partial record.
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            record_file_name(document_id),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| RagError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RagError::io(&path, e));
        }

        tracing::debug!(document = document_id, path = %path.display(), "stored embedding record");
        Ok(())
    }

    async fn get(&self, document_id: &str) -> Result<Option<EmbeddingRecord>> {
        let path = self.record_path(document_id);
        if !self.has(document_id).await? {
            return Ok(None);
        }
        load_record(&path).await.map(Some)
    }

    async fn list_all(&self) -> Result<Vec<EmbeddingRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RagError::io(&self.dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RagError::io(&self.dir, e))?
        {
            let path = entry.path();
            if is_record_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            match load_record(&path).await {
                Ok(record) if record.embeddings.is_empty() => {
                    tracing::warn!(path = %path.display(), "skipping record with no embeddings");
                }
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable record");
                }
            }
        }

        records.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(records)
    }
}

/// In-memory store for tests and library embedding.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, EmbeddingRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn has(&self, document_id: &str) -> Result<bool> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.contains_key(document_id))
    }

    async fn put(&self, document_id: &str, record: &EmbeddingRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(document_id.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, document_id: &str) -> Result<Option<EmbeddingRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(document_id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<EmbeddingRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<EmbeddingRecord> = records
            .iter()
            .filter(|(id, r)| {
                if r.embeddings.is_empty() {
                    tracing::warn!(document = %id, "skipping record with no embeddings");
                    false
                } else {
                    true
                }
            })
            .map(|(_, r)| r.clone())
            .collect();
        all.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(source: &str, vectors: Vec<Vec<f32>>) -> EmbeddingRecord {
        EmbeddingRecord::new(source, vectors, 100, "test-model")
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("/home/me/Notes/Daily Log.org"), "home-me-notes-daily-log-org");
        assert_eq!(slugify("alice.txt"), "alice-txt");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("ünïcode/ä.md"), "n-code-md");
    }

    #[test]
    fn test_encode_failure_is_io_error() {
        let cause = serde_json::from_str::<u8>("not a number").unwrap_err();
        let err = encode_error(Path::new("/store/a-txt.json"), cause);
        match err {
            RagError::Io { path, source } => {
                assert_eq!(path, PathBuf::from("/store/a-txt.json"));
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidData);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_slug_is_capped() {
        let long = "a".repeat(500);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_file_name_deterministic_and_distinct() {
        let a = record_file_name("notes/a b.txt");
        assert_eq!(a, record_file_name("notes/a b.txt"));
        assert_ne!(a, record_file_name("notes/a-b.txt"));
        assert!(a.starts_with("notes-a-b-txt-"));
        assert!(a.ends_with(".json"));
    }

    #[test]
    fn test_file_name_without_slug() {
        let name = record_file_name("///");
        assert_eq!(name.len(), HASH_PREFIX_LEN + ".json".len());
    }

    #[tokio::test]
    async fn test_put_has_get() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path().join("embed"));

        assert!(!store.has("a.txt").await.unwrap());
        assert!(store.get("a.txt").await.unwrap().is_none());

        let rec = record("a.txt", vec![vec![1.0, 0.0]]);
        store.put("a.txt", &rec).await.unwrap();

        assert!(store.has("a.txt").await.unwrap());
        assert_eq!(store.get("a.txt").await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        store
            .put("a.txt", &record("a.txt", vec![vec![1.0]]))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![record_file_name("a.txt")]);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path().join("never-created"));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_and_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());

        store
            .put("good.txt", &record("good.txt", vec![vec![1.0, 2.0]]))
            .await
            .unwrap();
        store
            .put("empty.txt", &record("empty.txt", Vec::new()))
            .await
            .unwrap();
        std::fs::write(tmp.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "not a record").unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].source, "good.txt");
    }

    #[tokio::test]
    async fn test_get_corrupt_record_is_typed() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        std::fs::write(store.record_path("x.txt"), "[]").unwrap();
        let err = store.get("x.txt").await.unwrap_err();
        assert!(matches!(err, RagError::CorruptRecord { .. }));
    }

    #[tokio::test]
    async fn test_reads_records_without_model_field() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        std::fs::write(
            store.record_path("/notes/old.org"),
            r#"{"embeddings":[[0.1,0.2,0.3]],"chunk_size":100,"source":"/notes/old.org"}"#,
        )
        .unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].model, None);
        assert!(store.has("/notes/old.org").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_puts_distinct_ids() {
        let tmp = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FsStore::new(tmp.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("doc-{}.txt", i);
                store
                    .put(&id, &record(&id, vec![vec![i as f32, 1.0]]))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.list_all().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStore::new();
        store
            .put("b.txt", &record("b.txt", vec![vec![1.0]]))
            .await
            .unwrap();
        store
            .put("a.txt", &record("a.txt", vec![vec![1.0]]))
            .await
            .unwrap();
        store
            .put("z.txt", &record("z.txt", Vec::new()))
            .await
            .unwrap();

        assert!(store.has("a.txt").await.unwrap());
        let all = store.list_all().await.unwrap();
        let sources: Vec<&str> = all.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "b.txt"]);
    }
}
