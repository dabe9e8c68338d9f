//! Provider trait: the abstraction over the language-model backend.
//!
//! A Provider receives the conversation history, the retrieved knowledge
//! and the tool schemas, and answers with either text or a single tool call.
//! The reply is a tagged union so callers match it exhaustively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::knowledge::ScoredChunk;
use crate::message::Turn;
use crate::tool::ToolCall;

/// Rendered into the prompt when retrieval produced nothing.
pub const NO_CONTEXT_NOTICE: &str =
    "No knowledge base context is available for this question.";

/// Everything the model needs for one generation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use (e.g., "openai/gpt-4o-mini")
    pub model: String,

    /// Persona, rules and tone
    pub system_prompt: String,

    /// Conversation turns so far, oldest first
    pub history: Vec<Turn>,

    /// Chunks retrieved for the current user turn
    #[serde(default)]
    pub retrieved: Vec<ScoredChunk>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ModelRequest {
    /// Render retrieved chunks as a labelled context block.
    pub fn context_block(&self) -> String {
        if self.retrieved.is_empty() {
            return NO_CONTEXT_NOTICE.to_string();
        }

        let mut block = String::from("Knowledge base excerpts:\n");
        for (i, hit) in self.retrieved.iter().enumerate() {
            block.push_str(&format!(
                "\n[{}] Source: {} (chunk {}, relevance {:.2})\n{}\n",
                i + 1,
                hit.chunk.source_document,
                hit.chunk.chunk_index,
                hit.score,
                hit.chunk.text.trim()
            ));
        }
        block
    }

    /// The system message actually sent: prompt followed by the context block.
    pub fn system_message(&self) -> String {
        format!("{}\n\n{}", self.system_prompt.trim_end(), self.context_block())
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ModelReply {
    /// A final answer for the user.
    Text(String),

    /// A request to run exactly one tool.
    ToolCall {
        call: ToolCall,
        /// Any text the model produced alongside the call
        #[serde(default)]
        preamble: String,
    },
}

impl ModelReply {
    /// Build a reply from raw completion parts.
    ///
    /// When the model asked for several tools at once only the first one is
    /// kept; the count of dropped calls is returned so the caller can log it.
    pub fn from_parts(content: Option<String>, mut calls: Vec<ToolCall>) -> (Self, usize) {
        let content = content.unwrap_or_default();
        if calls.is_empty() {
            return (ModelReply::Text(content), 0);
        }
        let dropped = calls.len() - 1;
        let call = calls.swap_remove(0);
        (
            ModelReply::ToolCall {
                call,
                preamble: content,
            },
            dropped,
        )
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The parsed reply
    pub reply: ModelReply,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "text-embedding-3-small").
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,

    /// Token usage.
    pub usage: Option<Usage>,
}

/// The core Provider trait.
///
/// The agent loop calls `complete()` without knowing which backend answers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ModelRequest) -> Result<ProviderResponse, ProviderError>;

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support embeddings",
            self.name()
        )))
    }

    /// Can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
