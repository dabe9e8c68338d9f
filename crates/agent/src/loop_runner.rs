//! The agent loop: one user message in, one reply out.
//!
//! ```text
//! AwaitingInput → Retrieving → Generating → (ToolExecuting → Generating)* → Responded
//! ```
//!
//! Retrieval runs once per user turn. Each generation step sends the history,
//! the retrieved chunks and the tool schemas to the model, which answers with
//! text or a single tool call. Tool calls are dispatched (at most
//! `max_tool_iterations` per user turn) and their results fed back. Model
//! failures are retried; when retries run out the user gets an apology turn
//! and the session stays usable.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use supportdesk_config::AppConfig;
use supportdesk_core::error::{Error, RetrievalError};
use supportdesk_core::event::{DomainEvent, EventBus};
use supportdesk_core::knowledge::ScoredChunk;
use supportdesk_core::message::{Conversation, Turn, truncate_chars};
use supportdesk_core::provider::{ModelReply, ModelRequest, Provider};
use supportdesk_core::tool::{ToolCall, ToolResult};
use supportdesk_providers::RetryPolicy;
use supportdesk_tools::{SupportTool, ToolContext, ToolRegistry};
use tracing::{debug, info, warn};

use crate::prompt::{Persona, system_prompt};
use crate::sentiment::Sentiment;
use crate::session::Session;

/// Sent when the model cannot be reached after every retry.
pub const APOLOGY_MESSAGE: &str = "I'm sorry, I'm having trouble reaching our support \
    assistant right now. Please try again in a moment, or ask me to escalate this to Tier-2 support.";

/// Sent when the model keeps asking for tools past the per-turn bound.
pub const ESCALATION_FALLBACK: &str = "I apologize, but I couldn't resolve this automatically. \
    I recommend escalating this to Tier-2 support so a specialist can take a closer look.";

/// Length of the previous answer carried into the retrieval query.
const CONDENSED_ANSWER_CHARS: usize = 200;

/// Turns and characters of conversation copied into a ticket.
const EXCERPT_TURNS: usize = 6;
const EXCERPT_CHARS: usize = 2000;

/// Where the loop is within a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingInput,
    Retrieving,
    Generating,
    ToolExecuting,
    Responded,
}

/// How a user turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The model answered.
    Answered,
    /// A ticket was filed, or escalation was recommended after the tool bound.
    Escalated,
    /// The model could not be reached; the reply is an apology.
    ModelUnavailable,
}

/// The reply to one user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub text: String,
    pub outcome: Outcome,
    /// Phases visited, in order
    pub phases: Vec<Phase>,
    /// Tools dispatched this turn, in order
    pub tools_used: Vec<String>,
    /// Source documents behind the answer
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
}

/// The orchestrator; shared by every session.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    persona: Persona,
    top_k: usize,
    max_tool_iterations: u32,
    retry: RetryPolicy,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            persona: Persona::default(),
            top_k: 3,
            max_tool_iterations: 3,
            retry: RetryPolicy::default(),
            event_bus,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(provider, &config.provider.model, tools, event_bus)
            .with_temperature(config.provider.temperature)
            .with_max_tokens(config.provider.max_tokens)
            .with_top_k(config.retrieval.top_k)
            .with_max_tool_iterations(config.agent.max_tool_iterations)
            .with_retry(RetryPolicy::from_config(config))
            .with_persona(Persona::from_config(&config.agent))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the maximum number of tool dispatches per user turn.
    pub fn with_max_tool_iterations(mut self, max: u32) -> Self {
        self.max_tool_iterations = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// A fresh session bound to this agent's tools.
    pub fn new_session(&self, id: impl Into<String>) -> Session {
        Session::new(id, self.tools.clone())
    }

    /// Handle one user message.
    ///
    /// Only a fatal error (the ticket log cannot be written) is returned as
    /// `Err`; everything else ends in a reply.
    pub async fn handle(&self, session: &mut Session, user_message: &str) -> Result<AgentReply, Error> {
        let session_id = session.id.clone();
        info!(
            session_id = %session_id,
            turns = session.conversation.len(),
            "Processing user message"
        );
        self.event_bus.publish(DomainEvent::TurnStarted {
            session_id: session_id.clone(),
            content_preview: truncate_chars(user_message, 80),
            timestamp: Utc::now(),
        });

        let mut phases = vec![Phase::AwaitingInput, Phase::Retrieving];
        let query = retrieval_query(&session.conversation, user_message);
        session.conversation.push(Turn::user(user_message))?;

        let retrieved = self.retrieve(&session_id, &query).await;
        let mut sources = distinct_sources(&retrieved);

        let sentiment = Sentiment::detect(user_message);
        debug!(session_id = %session_id, sentiment = %sentiment, "Detected sentiment");
        let system_prompt = system_prompt(&self.persona, sentiment);
        let definitions = self.tools.definitions();

        let mut dispatched: u32 = 0;
        let mut tools_used = Vec::new();
        let mut ticket_id = None;

        loop {
            phases.push(Phase::Generating);
            let request = ModelRequest {
                model: self.model.clone(),
                system_prompt: system_prompt.clone(),
                history: session.conversation.turns().to_vec(),
                retrieved: retrieved.clone(),
                tools: definitions.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let response = self
                .retry
                .run(
                    "chat",
                    |_| self.provider.complete(request.clone()),
                    |attempt, e| {
                        self.event_bus.publish(DomainEvent::ModelCallFailed {
                            session_id: session_id.clone(),
                            attempt,
                            error_message: e.to_string(),
                            timestamp: Utc::now(),
                        })
                    },
                )
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Model unavailable, apologizing");
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: format!("session {session_id}"),
                        error_message: Error::from(e).to_string(),
                        timestamp: Utc::now(),
                    });
                    session.conversation.push(Turn::assistant(APOLOGY_MESSAGE))?;
                    phases.push(Phase::Responded);
                    return Ok(AgentReply {
                        text: APOLOGY_MESSAGE.into(),
                        outcome: Outcome::ModelUnavailable,
                        phases,
                        tools_used,
                        sources,
                        ticket_id,
                    });
                }
            };

            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    session_id: session_id.clone(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            let (call, preamble) = match response.reply {
                ModelReply::Text(text) => {
                    session.conversation.push(Turn::assistant(text.clone()))?;
                    phases.push(Phase::Responded);
                    let outcome = if ticket_id.is_some() {
                        Outcome::Escalated
                    } else {
                        Outcome::Answered
                    };
                    info!(
                        session_id = %session_id,
                        outcome = ?outcome,
                        tools = tools_used.len(),
                        "Turn complete"
                    );
                    return Ok(AgentReply {
                        text,
                        outcome,
                        phases,
                        tools_used,
                        sources,
                        ticket_id,
                    });
                }
                ModelReply::ToolCall { call, preamble } => (call, preamble),
            };

            if dispatched >= self.max_tool_iterations {
                warn!(
                    session_id = %session_id,
                    tool = %call.tool_name,
                    error = %Error::ToolBoundExceeded { limit: self.max_tool_iterations },
                    "Forcing escalation"
                );
                session.conversation.push(Turn::assistant(ESCALATION_FALLBACK))?;
                phases.push(Phase::Responded);
                return Ok(AgentReply {
                    text: ESCALATION_FALLBACK.into(),
                    outcome: Outcome::Escalated,
                    phases,
                    tools_used,
                    sources,
                    ticket_id,
                });
            }

            phases.push(Phase::ToolExecuting);
            dispatched += 1;
            let ctx = ToolContext {
                session_id: session_id.clone(),
                conversation_excerpt: session.conversation.excerpt(EXCERPT_TURNS, EXCERPT_CHARS),
            };
            let result = self.dispatch(session, &call, &ctx).await?;

            tools_used.push(call.tool_name.clone());
            if result.success {
                if let Some(id) = ticket_of(&result) {
                    ticket_id = Some(id);
                }
                for source in searched_sources(&result) {
                    if !sources.contains(&source) {
                        sources.push(source);
                    }
                }
            }

            session
                .conversation
                .push_tool_exchange(Turn::assistant_tool_call(preamble, call), result)?;
        }
    }

    async fn retrieve(&self, session_id: &str, query: &str) -> Vec<ScoredChunk> {
        let hits = match self.tools.retriever().retrieve(query, self.top_k).await {
            Ok(result) => result.hits,
            Err(RetrievalError::EmptyIndex) => {
                debug!(session_id, "Knowledge store is empty, answering without context");
                Vec::new()
            }
            Err(e) => {
                warn!(session_id, error = %e, "Retrieval failed, answering without context");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: format!("retrieval for session {session_id}"),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Vec::new()
            }
        };

        self.event_bus.publish(DomainEvent::KnowledgeRetrieved {
            session_id: session_id.to_string(),
            hits: hits.len(),
            top_score: hits.first().map(|h| h.score),
            timestamp: Utc::now(),
        });
        hits
    }

    /// Dispatch one call; recoverable failures become an error result for the model.
    async fn dispatch(
        &self,
        session: &mut Session,
        call: &ToolCall,
        ctx: &ToolContext,
    ) -> Result<ToolResult, Error> {
        let (result, cached, duration_ms) = match session.dispatcher.dispatch(call, ctx).await {
            Ok(d) => (d.result, d.cached, d.duration.as_millis() as u64),
            Err(e) if e.is_fatal() => {
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: format!("tool {} in session {}", call.tool_name, session.id),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e.into());
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    call_id = %call.call_id,
                    tool = %call.tool_name,
                    error = %e,
                    "Tool call rejected"
                );
                (ToolResult::error(call, &e), false, 0)
            }
        };

        self.event_bus.publish(DomainEvent::ToolExecuted {
            session_id: session.id.clone(),
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            success: result.success,
            cached,
            duration_ms,
            timestamp: Utc::now(),
        });

        if !cached && result.success && call.tool_name == SupportTool::CreateTicket.name() {
            if let Some(id) = ticket_of(&result) {
                self.event_bus.publish(DomainEvent::TicketCreated {
                    session_id: session.id.clone(),
                    ticket_id: id,
                    severity: result
                        .data
                        .as_ref()
                        .and_then(|d| d["severity"].as_str())
                        .unwrap_or_default()
                        .to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(result)
    }
}

/// The last user message plus a condensed copy of the previous answer, so
/// follow-ups like "and on Windows?" still retrieve the right chunks.
pub(crate) fn retrieval_query(conversation: &Conversation, user_message: &str) -> String {
    match conversation.last_assistant_answer() {
        Some(answer) if !answer.trim().is_empty() => format!(
            "{}\n{}",
            user_message.trim(),
            truncate_chars(answer.trim(), CONDENSED_ANSWER_CHARS)
        ),
        _ => user_message.trim().to_string(),
    }
}

fn distinct_sources(hits: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for hit in hits {
        if !sources.contains(&hit.chunk.source_document) {
            sources.push(hit.chunk.source_document.clone());
        }
    }
    sources
}

fn ticket_of(result: &ToolResult) -> Option<String> {
    if result.tool_name != SupportTool::CreateTicket.name() {
        return None;
    }
    result
        .data
        .as_ref()
        .and_then(|d| d["ticket_id"].as_str())
        .map(String::from)
}

fn searched_sources(result: &ToolResult) -> Vec<String> {
    if result.tool_name != SupportTool::SearchKnowledgeBase.name() {
        return Vec::new();
    }
    result
        .data
        .as_ref()
        .and_then(|d| d["sources"].as_array())
        .map(|a| a.iter().filter_map(|s| s.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;
    use std::time::Duration;
    use supportdesk_core::error::ProviderError;
    use supportdesk_core::message::Role;
    use supportdesk_core::provider::NO_CONTEXT_NOTICE;
    use supportdesk_core::ticket::Severity;

    const DOCS: &[(&str, &str)] = &[
        (
            "nebula_manual.txt",
            "To reset your password, click Forgot Password on the login page and follow the emailed link.",
        ),
        ("nebula_manual.txt", "Error 500 means the server hit an internal error; retry after a minute."),
        ("billing.md", "Invoices are issued on the first business day of each month."),
    ];

    #[tokio::test]
    async fn password_reset_is_answered_from_knowledge() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![text(
            "According to nebula_manual.txt, click Forgot Password on the login page.",
        )]));
        let agent = agent_with(provider.clone(), registry(dir.path(), DOCS));
        let mut session = agent.new_session("s-1");

        let reply = agent.handle(&mut session, "How do I reset my password?").await.unwrap();

        assert_eq!(reply.outcome, Outcome::Answered);
        assert!(reply.text.contains("Forgot Password"));
        assert_eq!(reply.sources[0], "nebula_manual.txt");
        assert!(reply.tools_used.is_empty());
        assert_eq!(
            reply.phases,
            vec![Phase::AwaitingInput, Phase::Retrieving, Phase::Generating, Phase::Responded]
        );

        let request = &provider.requests()[0];
        assert!(request.retrieved.len() <= 3);
        assert!(request.retrieved[0].chunk.text.contains("reset your password"));
        assert!(request.system_message().contains("Source: nebula_manual.txt"));
        assert_eq!(request.tools.len(), 3);
        assert_eq!(session.conversation.len(), 2);
    }

    #[tokio::test]
    async fn urgent_unknown_issue_files_a_ticket() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(dir.path(), DOCS);
        let provider = Arc::new(SequentialMockProvider::new(vec![
            tool_reply(
                "call_1",
                "create_ticket",
                json!({"summary": "Quantum sync fails with code Q-77", "severity": "high"}),
            ),
            text("I've escalated this to Tier-2 support; they will contact you shortly."),
        ]));
        let agent = agent_with(provider.clone(), tools.clone());
        let mut events = agent.event_bus().subscribe();
        let mut session = agent.new_session("s-urgent");

        let reply = agent
            .handle(&mut session, "URGENT: quantum sync fails with code Q-77, production is down!")
            .await
            .unwrap();

        assert_eq!(reply.outcome, Outcome::Escalated);
        assert_eq!(reply.tools_used, vec!["create_ticket"]);

        let tickets = tools.ticket_log().list().await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].severity, Severity::High);
        assert_eq!(tickets[0].session_id, "s-urgent");
        assert!(tickets[0].conversation_excerpt.contains("quantum sync"));
        assert_eq!(reply.ticket_id.as_deref(), Some(tickets[0].id.as_str()));

        // user, assistant(call), tool, assistant
        let roles: Vec<Role> = session.conversation.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert!(session.conversation.is_consistent());

        // The second model call sees the tool result.
        let second = &provider.requests()[1];
        assert!(second.history[2].content.contains("Ticket Escalated Successfully!"));

        let mut ticket_events = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event.as_ref(), DomainEvent::TicketCreated { .. }) {
                ticket_events += 1;
            }
        }
        assert_eq!(ticket_events, 1);
    }

    #[tokio::test]
    async fn empty_index_answers_without_context() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![text(
            "I could not find this in our documentation.",
        )]));
        let agent = agent_with(provider.clone(), registry(dir.path(), &[]));
        let mut session = agent.new_session("s-empty");

        let reply = agent.handle(&mut session, "How do I reset my password?").await.unwrap();

        assert_eq!(reply.outcome, Outcome::Answered);
        assert!(reply.sources.is_empty());
        let request = &provider.requests()[0];
        assert!(request.retrieved.is_empty());
        assert!(request.system_message().ends_with(NO_CONTEXT_NOTICE));
    }

    #[tokio::test]
    async fn pathological_model_hits_the_tool_bound() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(LoopingToolProvider::new(
            "calculate_pricing",
            json!({"number_of_users": 5, "plan_type": "pro"}),
        ));
        let agent = agent_with(provider.clone(), registry(dir.path(), DOCS));
        let mut session = agent.new_session("s-loop");

        let reply = agent.handle(&mut session, "price?").await.unwrap();

        assert_eq!(session.dispatcher.executed(), 3);
        assert_eq!(reply.tools_used.len(), 3);
        assert_eq!(provider.call_count(), 4);
        assert_eq!(reply.outcome, Outcome::Escalated);
        assert_eq!(reply.text, ESCALATION_FALLBACK);
        assert_eq!(
            reply.phases.iter().filter(|p| **p == Phase::ToolExecuting).count(),
            3
        );

        let last = session.conversation.turns().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.tool_call.is_none());
        assert!(session.conversation.is_consistent());
    }

    #[tokio::test]
    async fn tool_bound_is_per_user_turn() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(LoopingToolProvider::new(
            "calculate_pricing",
            json!({"number_of_users": 1, "plan_type": "basic"}),
        ));
        let agent = agent_with(provider, registry(dir.path(), DOCS)).with_max_tool_iterations(2);
        let mut session = agent.new_session("s-loop2");

        agent.handle(&mut session, "one").await.unwrap();
        agent.handle(&mut session, "two").await.unwrap();
        assert_eq!(session.dispatcher.executed(), 4);
    }

    #[tokio::test]
    async fn repeated_call_id_executes_once() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(dir.path(), DOCS);
        let args = json!({"summary": "Export stuck at 99%", "severity": "medium"});
        let provider = Arc::new(SequentialMockProvider::new(vec![
            tool_reply("call_dup", "create_ticket", args.clone()),
            tool_reply("call_dup", "create_ticket", args),
            text("Your ticket is filed."),
        ]));
        let agent = agent_with(provider, tools.clone());
        let mut session = agent.new_session("s-dup");

        let reply = agent.handle(&mut session, "export is stuck").await.unwrap();

        assert_eq!(tools.ticket_log().list().await.unwrap().len(), 1);
        assert_eq!(session.dispatcher.executed(), 1);
        let results: Vec<_> = session
            .conversation
            .turns()
            .iter()
            .filter_map(|t| t.tool_result.clone())
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], results[1]);
        assert_eq!(reply.outcome, Outcome::Escalated);
        assert!(session.conversation.is_consistent());
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            tool_reply("c1", "reboot_server", json!({})),
            text("I can't do that, but here is what I found."),
        ]));
        let agent = agent_with(provider.clone(), registry(dir.path(), DOCS));
        let mut session = agent.new_session("s-unknown");

        let reply = agent.handle(&mut session, "reboot the server").await.unwrap();

        assert_eq!(reply.outcome, Outcome::Answered);
        let tool_turn = &session.conversation.turns()[2];
        assert_eq!(tool_turn.role, Role::Tool);
        assert!(tool_turn.content.starts_with("Error: Unknown tool: reboot_server"));
        assert!(!tool_turn.tool_result.as_ref().unwrap().success);
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_to_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(dir.path(), DOCS);
        let provider = Arc::new(SequentialMockProvider::new(vec![
            tool_reply("c1", "create_ticket", json!({"severity": "high"})),
            text("Could you describe the issue?"),
        ]));
        let agent = agent_with(provider, tools.clone());
        let mut session = agent.new_session("s-invalid");

        agent.handle(&mut session, "file a ticket").await.unwrap();

        assert!(tools.ticket_log().list().await.unwrap().is_empty());
        let tool_turn = &session.conversation.turns()[2];
        assert!(tool_turn.content.contains("missing required field 'summary'"));
    }

    #[tokio::test]
    async fn search_results_add_sources() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            tool_reply("c1", "search_knowledge_base", json!({"query": "invoices monthly"})),
            text("According to billing.md, invoices go out monthly."),
        ]));
        let agent = agent_with(provider, registry(dir.path(), DOCS)).with_top_k(1);
        let mut session = agent.new_session("s-search");

        let reply = agent.handle(&mut session, "reset password").await.unwrap();
        assert!(reply.sources.contains(&"billing.md".to_string()));
        assert_eq!(reply.tools_used, vec!["search_knowledge_base"]);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_model_failure_apologizes() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FailingProvider::new(ProviderError::Network("connection reset".into())));
        let agent = agent_with(provider.clone(), registry(dir.path(), DOCS)).with_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
            attempt_timeout: Duration::from_secs(5),
        });
        let mut events = agent.event_bus().subscribe();
        let mut session = agent.new_session("s-down");

        let reply = agent.handle(&mut session, "hello?").await.unwrap();

        assert_eq!(provider.call_count(), 3);
        assert_eq!(reply.outcome, Outcome::ModelUnavailable);
        assert_eq!(reply.text, APOLOGY_MESSAGE);
        let last = session.conversation.turns().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, APOLOGY_MESSAGE);

        let mut failures = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event.as_ref(), DomainEvent::ModelCallFailed { .. }) {
                failures += 1;
            }
        }
        assert_eq!(failures, 3);
    }

    #[tokio::test]
    async fn session_survives_a_failed_turn() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::scripted(vec![
            Err(ProviderError::Timeout("slow".into())),
            Ok(text("Back online, how can I help?")),
        ]));
        let agent = agent_with(provider, registry(dir.path(), DOCS));
        let mut session = agent.new_session("s-recover");

        let first = agent.handle(&mut session, "hi").await.unwrap();
        assert_eq!(first.outcome, Outcome::ModelUnavailable);
        let second = agent.handle(&mut session, "hi again").await.unwrap();
        assert_eq!(second.outcome, Outcome::Answered);
        assert_eq!(session.conversation.len(), 4);
    }

    #[tokio::test]
    async fn fatal_ticket_log_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = supportdesk_knowledge::HashingEmbedder::new(16);
        let retriever = supportdesk_knowledge::Retriever::new(
            Arc::new(supportdesk_knowledge::KnowledgeStore::new("hashing-16", 16)),
            Arc::new(embedder),
            supportdesk_core::knowledge::Similarity::Cosine,
        );
        // The ticket log path is a directory, so appends fail.
        let log = Arc::new(supportdesk_tools::TicketLog::open(dir.path().join("logdir")).unwrap());
        std::fs::create_dir(dir.path().join("logdir")).unwrap();
        let tools = Arc::new(ToolRegistry::new(retriever, log));

        let provider = Arc::new(SequentialMockProvider::new(vec![tool_reply(
            "c1",
            "create_ticket",
            json!({"summary": "disk full"}),
        )]));
        let agent = agent_with(provider, tools);
        let mut session = agent.new_session("s-fatal");

        let err = agent.handle(&mut session, "help").await.unwrap_err();
        assert!(err.is_fatal());
        assert!(session.conversation.is_consistent());
        assert_eq!(session.conversation.len(), 1);
    }

    #[tokio::test]
    async fn angry_customer_gets_apologetic_tone() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![text("I sincerely apologize.")]));
        let agent = agent_with(provider.clone(), registry(dir.path(), DOCS));
        let mut session = agent.new_session("s-angry");

        agent.handle(&mut session, "This is the worst, nothing works").await.unwrap();
        assert!(provider.requests()[0].system_prompt.contains("APOLOGETIC"));
    }

    #[test]
    fn retrieval_query_carries_condensed_answer() {
        let mut conversation = Conversation::new();
        assert_eq!(retrieval_query(&conversation, "  reset password "), "reset password");

        conversation.push(Turn::user("How do I reset my password?")).unwrap();
        conversation.push(Turn::assistant("x".repeat(500))).unwrap();
        let query = retrieval_query(&conversation, "and on mobile?");
        assert!(query.starts_with("and on mobile?\n"));
        assert_eq!(query.chars().count(), "and on mobile?\n".len() + CONDENSED_ANSWER_CHARS);
    }
}
