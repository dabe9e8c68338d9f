//! The knowledge store: embedded chunks persisted as one JSON file.
//!
//! Built offline by ingestion, loaded once at startup and shared read-only
//! (`Arc<KnowledgeStore>`) by every session.
//!
//! File layout: `{ "embedder", "dimension", "created_at", "chunks": [...] }`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use supportdesk_core::error::KnowledgeError;
use supportdesk_core::knowledge::{Embedder, KnowledgeChunk};
use tracing::{debug, info, warn};

#[derive(Serialize, Deserialize)]
struct IndexFile {
    embedder: String,
    dimension: usize,
    created_at: DateTime<Utc>,
    chunks: Vec<KnowledgeChunk>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    embedder: String,
    dimension: usize,
    created_at: DateTime<Utc>,
    chunks: Vec<Arc<KnowledgeChunk>>,
    ids: HashSet<String>,
}

impl KnowledgeStore {
    /// An empty store for vectors from `embedder`.
    pub fn new(embedder: impl Into<String>, dimension: usize) -> Self {
        Self {
            embedder: embedder.into(),
            dimension,
            created_at: Utc::now(),
            chunks: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Add a chunk. Returns `false` when an identical chunk is already stored.
    pub fn insert(&mut self, chunk: KnowledgeChunk) -> Result<bool, KnowledgeError> {
        if self.dimension == 0 {
            self.dimension = chunk.embedding.len();
        }
        if chunk.embedding.len() != self.dimension {
            return Err(KnowledgeError::Ingestion(format!(
                "chunk {} has {} dimensions, store expects {}",
                chunk.short_id(),
                chunk.embedding.len(),
                self.dimension
            )));
        }
        if !self.ids.insert(chunk.id.clone()) {
            return Ok(false);
        }
        self.chunks.push(Arc::new(chunk));
        Ok(true)
    }

    pub fn chunks(&self) -> &[Arc<KnowledgeChunk>] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn embedder(&self) -> &str {
        &self.embedder
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Distinct source documents, in ingestion order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.chunks
            .iter()
            .map(|c| c.source_document.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Load a store file.
    pub fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let content = std::fs::read_to_string(path).map_err(|e| KnowledgeError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let file: IndexFile = serde_json::from_str(&content).map_err(|e| KnowledgeError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut store = Self::new(file.embedder, file.dimension);
        store.created_at = file.created_at;
        for chunk in file.chunks {
            store.insert(chunk).map_err(|e| KnowledgeError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        debug!(path = %path.display(), chunks = store.len(), "Knowledge store loaded");
        Ok(store)
    }

    /// Load a store for use with `embedder`.
    ///
    /// A missing file yields an empty store (retrieval then reports
    /// `EmptyIndex`); a store built by a different embedder is refused.
    pub fn open(path: &Path, embedder: &dyn Embedder) -> Result<Self, KnowledgeError> {
        if !path.exists() {
            warn!(
                path = %path.display(),
                "No knowledge store found; answers will have no knowledge base context"
            );
            return Ok(Self::new(embedder.id(), embedder.dimension()));
        }

        let store = Self::load(path)?;
        if store.embedder != embedder.id() {
            return Err(KnowledgeError::EmbedderMismatch {
                index: store.embedder,
                runtime: embedder.id(),
            });
        }
        info!(
            path = %path.display(),
            chunks = store.len(),
            embedder = %store.embedder,
            "Knowledge store ready"
        );
        Ok(store)
    }

    /// Write the store atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), KnowledgeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_err(path, e))?;
        }

        let file = IndexFile {
            embedder: self.embedder.clone(),
            dimension: self.dimension,
            created_at: self.created_at,
            chunks: self.chunks.iter().map(|c| c.as_ref().clone()).collect(),
        };
        let json = serde_json::to_string(&file).map_err(|e| write_err(path, e))?;

        let tmp = temp_path(path);
        std::fs::write(&tmp, json).map_err(|e| write_err(path, e))?;
        std::fs::rename(&tmp, path).map_err(|e| write_err(path, e))?;

        info!(path = %path.display(), chunks = self.len(), "Knowledge store saved");
        Ok(())
    }
}

fn write_err(path: &Path, e: impl std::fmt::Display) -> KnowledgeError {
    KnowledgeError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;

    fn chunk(src: &str, idx: usize, text: &str) -> KnowledgeChunk {
        KnowledgeChunk::new(src, idx, text, vec![1.0, 0.0, 0.0])
    }

    #[test]
    fn duplicate_chunks_are_ignored() {
        let mut store = KnowledgeStore::new("hashing-3", 3);
        assert!(store.insert(chunk("a.md", 0, "hello")).unwrap());
        assert!(!store.insert(chunk("a.md", 1, "hello")).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let mut store = KnowledgeStore::new("hashing-3", 3);
        let bad = KnowledgeChunk::new("a.md", 0, "x", vec![1.0]);
        assert!(store.insert(bad).is_err());
    }

    #[test]
    fn save_and_load_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");

        let mut store = KnowledgeStore::new("hashing-3", 3);
        store.insert(chunk("a.md", 0, "first")).unwrap();
        store.insert(chunk("b.md", 0, "second")).unwrap();
        store.insert(chunk("a.md", 1, "third")).unwrap();
        store.save(&path).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = KnowledgeStore::load(&path).unwrap();
        let texts: Vec<&str> = loaded.chunks().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(loaded.embedder(), "hashing-3");
        assert_eq!(loaded.sources(), vec!["a.md", "b.md"]);
    }

    #[test]
    fn open_missing_file_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::new(16);
        let store = KnowledgeStore::open(&dir.path().join("missing.json"), &embedder).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimension(), 16);
    }

    #[test]
    fn open_refuses_foreign_embedder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let mut store = KnowledgeStore::new("provider:text-embedding-3-small", 3);
        store.insert(chunk("a.md", 0, "x")).unwrap();
        store.save(&path).unwrap();

        let err = KnowledgeStore::open(&path, &HashingEmbedder::new(3)).unwrap_err();
        assert!(matches!(err, KnowledgeError::EmbedderMismatch { .. }));
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            KnowledgeStore::load(&path),
            Err(KnowledgeError::Parse { .. })
        ));
    }
}
