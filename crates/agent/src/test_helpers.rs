//! Scripted providers and fixtures shared by the agent tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use supportdesk_core::error::ProviderError;
use supportdesk_core::event::EventBus;
use supportdesk_core::knowledge::{Embedder, KnowledgeChunk, Similarity};
use supportdesk_core::provider::{ModelReply, ModelRequest, Provider, ProviderResponse, Usage};
use supportdesk_core::tool::ToolCall;
use supportdesk_knowledge::{HashingEmbedder, KnowledgeStore, Retriever};
use supportdesk_providers::RetryPolicy;
use supportdesk_tools::{TicketLog, ToolRegistry};

use crate::loop_runner::AgentLoop;

/// Returns scripted replies in order and records every request.
///
/// Panics if more calls are made than replies provided.
pub struct SequentialMockProvider {
    replies: Mutex<VecDeque<Result<ModelReply, ProviderError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl SequentialMockProvider {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self::scripted(replies.into_iter().map(Ok).collect())
    }

    pub fn scripted(replies: Vec<Result<ModelReply, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("SequentialMockProvider: no reply scripted for call #{call}"));
        reply.map(response)
    }
}

/// Always answers with the same text.
pub struct StaticProvider {
    text: String,
}

impl StaticProvider {
    pub fn text(text: &str) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait::async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(response(ModelReply::Text(self.text.clone())))
    }
}

/// A model that never stops asking for a tool; every call gets a fresh id.
pub struct LoopingToolProvider {
    tool_name: String,
    arguments: serde_json::Value,
    calls: AtomicUsize,
}

impl LoopingToolProvider {
    pub fn new(tool_name: &str, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for LoopingToolProvider {
    fn name(&self) -> &str {
        "looping_tool"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ProviderResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(response(tool_reply(
            &format!("loop_{n}"),
            &self.tool_name,
            self.arguments.clone(),
        )))
    }
}

/// Fails every call with the same error.
pub struct FailingProvider {
    error: ProviderError,
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new(error: ProviderError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

pub fn response(reply: ModelReply) -> ProviderResponse {
    ProviderResponse {
        reply,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn text(text: &str) -> ModelReply {
    ModelReply::Text(text.into())
}

pub fn tool_reply(call_id: &str, tool_name: &str, arguments: serde_json::Value) -> ModelReply {
    ModelReply::ToolCall {
        call: ToolCall::new(call_id, tool_name, arguments),
        preamble: String::new(),
    }
}

/// A registry over a hashing-embedded store of `docs` with a ticket log in `dir`.
pub fn registry(dir: &Path, docs: &[(&str, &str)]) -> Arc<ToolRegistry> {
    let embedder = HashingEmbedder::new(256);
    let mut store = KnowledgeStore::new(embedder.id(), embedder.dimension());
    for (i, (source, text)) in docs.iter().enumerate() {
        store
            .insert(KnowledgeChunk::new(*source, i, *text, embedder.embed_text(text)))
            .unwrap();
    }
    let retriever = Retriever::new(Arc::new(store), Arc::new(embedder), Similarity::Cosine);
    let log = Arc::new(TicketLog::open(dir.join("tickets.log")).unwrap());
    Arc::new(ToolRegistry::new(retriever, log))
}

/// An agent with a single-attempt retry policy.
pub fn agent_with(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> AgentLoop {
    AgentLoop::new(provider, "mock-model", tools, Arc::new(EventBus::default()))
        .with_retry(RetryPolicy::no_retry(Duration::from_secs(5)))
}
