//! Embedding backends.
//!
//! - [`HashingEmbedder`]: deterministic feature hashing, runs offline.
//! - [`ProviderEmbedder`]: the provider's `/embeddings` endpoint.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use supportdesk_config::{AppConfig, EmbedderKind};
use supportdesk_core::error::{ProviderError, RetrievalError};
use supportdesk_core::knowledge::Embedder;
use supportdesk_core::provider::{EmbeddingRequest, Provider};
use supportdesk_providers::RetryPolicy;
use tracing::debug;

/// Bag-of-words feature hashing into a fixed number of buckets.
///
/// Words and adjacent word pairs are hashed to a signed bucket; the result
/// is L2-normalized so cosine and inner product agree.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];

        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn id(&self) -> String {
        format!("hashing-{}", self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm > 1e-10 {
        for x in vector.iter_mut() {
            *x = (*x as f64 / norm) as f32;
        }
    }
}

/// Embeddings from the language-model provider.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
    retry: RetryPolicy,
    batch_size: usize,
    dimension: OnceLock<usize>,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            model: model.into(),
            retry,
            batch_size: 64,
            dimension: OnceLock::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .retry
            .run(
                "embeddings",
                |_| {
                    self.provider.embed(EmbeddingRequest {
                        model: self.model.clone(),
                        inputs: batch.to_vec(),
                    })
                },
                |_, _| {},
            )
            .await?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn id(&self) -> String {
        format!("provider:{}", self.model)
    }

    /// Zero until the first response reveals the model's vector length.
    fn dimension(&self) -> usize {
        self.dimension.get().copied().unwrap_or(0)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self
                .embed_batch(batch)
                .await
                .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
            debug!(model = %self.model, count = embedded.len(), "Embedded batch");
            vectors.extend(embedded);
        }

        for vector in &vectors {
            let expected = *self.dimension.get_or_init(|| vector.len());
            if vector.len() != expected {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        Ok(vectors)
    }
}

/// Build the embedder the configuration asks for.
pub fn from_config(
    config: &AppConfig,
    provider: Option<Arc<dyn Provider>>,
) -> Result<Arc<dyn Embedder>, ProviderError> {
    match config.retrieval.embedder {
        EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.retrieval.dimension))),
        EmbedderKind::Provider => {
            let provider = provider.ok_or_else(|| {
                ProviderError::NotConfigured(
                    "retrieval.embedder = \"provider\" needs an API key".into(),
                )
            })?;
            Ok(Arc::new(ProviderEmbedder::new(
                provider,
                config.provider.embedding_model.clone(),
                RetryPolicy::from_config(config),
            )))
        }
    }
}
