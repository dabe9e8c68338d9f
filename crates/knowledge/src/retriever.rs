//! Query embedding and top-K lookup over the shared knowledge store.

use std::sync::Arc;

use supportdesk_core::error::RetrievalError;
use supportdesk_core::knowledge::{Embedder, RetrievalResult, Similarity};
use tracing::debug;

use crate::similarity::top_k;
use crate::store::KnowledgeStore;

/// Read-only retriever; cheap to clone and share across sessions.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    similarity: Similarity,
}

impl Retriever {
    pub fn new(store: Arc<KnowledgeStore>, embedder: Arc<dyn Embedder>, similarity: Similarity) -> Self {
        Self {
            store,
            embedder,
            similarity,
        }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    /// The `k` chunks most similar to `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, RetrievalError> {
        if self.store.is_empty() {
            return Err(RetrievalError::EmptyIndex);
        }

        let vector = self.embedder.embed_query(query).await?;
        if vector.len() != self.store.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.store.dimension(),
                actual: vector.len(),
            });
        }

        let hits = top_k(self.store.chunks(), &vector, k, self.similarity);
        debug!(
            k,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            similarity = %self.similarity,
            "Retrieved knowledge"
        );

        Ok(RetrievalResult {
            query: query.to_string(),
            hits,
        })
    }
}
