//! Knowledge base search tool: runs the retriever and returns cited chunks.

use serde_json::{Map, Value, json};
use supportdesk_core::error::{RetrievalError, ToolError};
use supportdesk_core::knowledge::ScoredChunk;
use supportdesk_core::tool::{FieldKind, FieldSpec, SideEffect, ToolSchema};
use supportdesk_knowledge::Retriever;

use crate::ToolOutput;

pub const NAME: &str = "search_knowledge_base";

pub const NO_RESULTS: &str = "No relevant documentation was found for this query.";

/// Upper bound on `top_k` a model may ask for.
const MAX_TOP_K: u64 = 10;

pub fn schema() -> ToolSchema {
    ToolSchema {
        name: NAME.into(),
        description: "Search the product documentation for error codes, setup instructions, \
                      features and troubleshooting steps. Always cite the source document \
                      in your answer."
            .into(),
        side_effect: SideEffect::PureQuery,
        fields: vec![
            FieldSpec::required("query", FieldKind::String, "What to look up"),
            FieldSpec::optional(
                "top_k",
                FieldKind::Integer,
                "Maximum number of passages to return",
            )
            .at_least(1),
        ],
    }
}

pub async fn execute(
    retriever: &Retriever,
    default_top_k: usize,
    args: &Map<String, Value>,
) -> Result<ToolOutput, ToolError> {
    let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
    let top_k = args
        .get("top_k")
        .and_then(Value::as_u64)
        .map(|k| k.min(MAX_TOP_K) as usize)
        .unwrap_or(default_top_k);

    let result = match retriever.retrieve(query, top_k).await {
        Ok(result) => result,
        Err(RetrievalError::EmptyIndex) => {
            return Ok(ToolOutput {
                text: NO_RESULTS.into(),
                data: Some(json!({ "hits": [] })),
            });
        }
        Err(e @ RetrievalError::Embedding(_)) => {
            return Err(ToolError::Unavailable {
                tool_name: NAME.into(),
                reason: e.to_string(),
            });
        }
        Err(e) => {
            return Err(ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason: e.to_string(),
            });
        }
    };

    if result.is_empty() {
        return Ok(ToolOutput {
            text: NO_RESULTS.into(),
            data: Some(json!({ "hits": [] })),
        });
    }

    let text = result
        .hits
        .iter()
        .map(format_hit)
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    let hits: Vec<Value> = result
        .hits
        .iter()
        .map(|h| {
            json!({
                "source": h.chunk.source_document,
                "chunk": h.chunk.chunk_index,
                "id": h.chunk.id,
                "score": h.score,
            })
        })
        .collect();

    Ok(ToolOutput {
        text,
        data: Some(json!({ "hits": hits, "sources": result.sources() })),
    })
}

fn format_hit(hit: &ScoredChunk) -> String {
    format!(
        "[Source: {}, Chunk: {}, Relevance: {:.2}]\n{}",
        hit.chunk.source_document, hit.chunk.chunk_index, hit.score, hit.chunk.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use supportdesk_core::knowledge::{Embedder, KnowledgeChunk, Similarity};
    use supportdesk_knowledge::{HashingEmbedder, KnowledgeStore};

    fn retriever(texts: &[(&str, &str)]) -> Retriever {
        let embedder = HashingEmbedder::new(128);
        let mut store = KnowledgeStore::new(embedder.id(), embedder.dimension());
        for (i, (src, text)) in texts.iter().enumerate() {
            store
                .insert(KnowledgeChunk::new(*src, i, *text, embedder.embed_text(text)))
                .unwrap();
        }
        Retriever::new(Arc::new(store), Arc::new(embedder), Similarity::Cosine)
    }

    fn args(v: Value) -> Map<String, Value> {
        schema().validate(&v).unwrap()
    }

    #[tokio::test]
    async fn results_are_cited() {
        let r = retriever(&[
            ("errors.md", "Error 500 means an internal server error; retry after a minute."),
            ("billing.md", "Invoices are sent on the first day of the month."),
        ]);
        let out = execute(&r, 3, &args(json!({"query": "error 500", "top_k": 1})))
            .await
            .unwrap();
        assert!(out.text.starts_with("[Source: errors.md, Chunk: 0, Relevance: "));
        assert!(out.text.contains("internal server error"));
        assert!(!out.text.contains("---"));
        assert_eq!(out.data.unwrap()["sources"], json!(["errors.md"]));
    }

    #[tokio::test]
    async fn passages_are_separated() {
        let r = retriever(&[("a.md", "alpha beta"), ("b.md", "beta gamma")]);
        let out = execute(&r, 2, &args(json!({"query": "beta"}))).await.unwrap();
        assert_eq!(out.text.matches("\n\n---\n\n").count(), 1);
    }

    #[tokio::test]
    async fn empty_index_is_reported_as_no_results() {
        let r = retriever(&[]);
        let out = execute(&r, 3, &args(json!({"query": "anything"}))).await.unwrap();
        assert_eq!(out.text, NO_RESULTS);
    }
}
