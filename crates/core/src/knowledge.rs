//! Knowledge chunks, retrieval results, and the embedding boundary.
//!
//! Chunks are created by ingestion only and never change afterwards, so the
//! runtime shares them behind `Arc` without locks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RetrievalError;

/// A single embedded piece of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Hex SHA-256 of source document and text
    pub id: String,

    /// File name (or path) the chunk was cut from
    pub source_document: String,

    /// Ordinal position within the source document
    pub chunk_index: usize,

    /// The chunk text
    pub text: String,

    /// Embedding vector
    pub embedding: Vec<f32>,
}

impl KnowledgeChunk {
    pub fn new(
        source_document: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let source_document = source_document.into();
        let text = text.into();
        Self {
            id: content_id(&source_document, &text),
            source_document,
            chunk_index,
            text,
            embedding,
        }
    }

    /// A short prefix of the id for display.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

/// Content address of a chunk.
pub fn content_id(source_document: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_document.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// How query and chunk vectors are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    #[default]
    Cosine,
    InnerProduct,
}

impl std::fmt::Display for Similarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Similarity::Cosine => f.write_str("cosine"),
            Similarity::InnerProduct => f.write_str("inner_product"),
        }
    }
}

/// A chunk together with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Arc<KnowledgeChunk>,
    pub score: f32,
}

/// Top-K chunks for a query, descending by score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Distinct source documents in rank order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for hit in &self.hits {
            if !sources.contains(&hit.chunk.source_document) {
                sources.push(hit.chunk.source_document.clone());
            }
        }
        sources
    }
}

/// Turns text into vectors.
///
/// The identifier is stored in the knowledge index so an index is never
/// queried with vectors from a different embedder.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier, e.g. `hashing-384` or `provider:openai/text-embedding-3-small`.
    fn id(&self) -> String;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RetrievalError::Embedding("embedder returned no vector".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_content_addressed() {
        let a = KnowledgeChunk::new("faq.md", 0, "Reset via email.", vec![]);
        let b = KnowledgeChunk::new("faq.md", 7, "Reset via email.", vec![0.5]);
        let c = KnowledgeChunk::new("guide.md", 0, "Reset via email.", vec![]);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 64);
        assert_eq!(a.short_id().len(), 12);
    }

    #[test]
    fn sources_are_deduplicated_in_rank_order() {
        let hit = |src: &str, text: &str, score| ScoredChunk {
            chunk: Arc::new(KnowledgeChunk::new(src, 0, text, vec![])),
            score,
        };
        let result = RetrievalResult {
            query: "q".into(),
            hits: vec![hit("b.md", "x", 0.9), hit("a.md", "y", 0.8), hit("b.md", "z", 0.7)],
        };
        assert_eq!(result.sources(), vec!["b.md".to_string(), "a.md".to_string()]);
    }

    struct Fixed;

    #[async_trait]
    impl Embedder for Fixed {
        fn id(&self) -> String {
            "fixed".into()
        }
        fn dimension(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn embed_query_uses_batch_path() {
        let v = Fixed.embed_query("hello").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0]);
    }
}
