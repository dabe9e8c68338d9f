//! Vector similarity and top-K ranking.

use std::sync::Arc;

use supportdesk_core::knowledge::{KnowledgeChunk, ScoredChunk, Similarity};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Plain dot product; equals cosine for unit-length vectors.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum::<f64>() as f32
}

/// Score under `metric`. A vector holding NaN scores 0.
pub fn score(metric: Similarity, a: &[f32], b: &[f32]) -> f32 {
    let s = match metric {
        Similarity::Cosine => cosine_similarity(a, b),
        Similarity::InnerProduct => inner_product(a, b),
    };
    if s.is_nan() { 0.0 } else { s }
}

/// Rank chunks against a query vector and keep the best `k`.
///
/// The sort is stable, so equal scores keep insertion order (earliest
/// ingested first).
pub fn top_k(
    chunks: &[Arc<KnowledgeChunk>],
    query: &[f32],
    k: usize,
    metric: Similarity,
) -> Vec<ScoredChunk> {
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .map(|chunk| ScoredChunk {
            score: score(metric, &chunk.embedding, query),
            chunk: Arc::clone(chunk),
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}
