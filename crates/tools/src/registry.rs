//! The fixed tool set and the per-conversation dispatcher.
//!
//! [`ToolRegistry`] holds what the tools share across sessions (retriever,
//! ticket log). [`ToolDispatcher`] belongs to one conversation and remembers
//! every call id it has executed, so a repeated call returns the earlier
//! result instead of running again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use supportdesk_core::error::ToolError;
use supportdesk_core::provider::ToolDefinition;
use supportdesk_core::tool::{SideEffect, ToolCall, ToolResult, ToolSchema};
use supportdesk_knowledge::Retriever;
use supportdesk_providers::RetryPolicy;
use tracing::{debug, info, warn};

use crate::ticket_log::TicketLog;
use crate::{ToolContext, ToolOutput, create_ticket, knowledge_search, pricing};

/// Every tool the agent can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportTool {
    SearchKnowledgeBase,
    CalculatePricing,
    CreateTicket,
}

impl SupportTool {
    pub const ALL: [SupportTool; 3] = [
        SupportTool::SearchKnowledgeBase,
        SupportTool::CalculatePricing,
        SupportTool::CreateTicket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SupportTool::SearchKnowledgeBase => knowledge_search::NAME,
            SupportTool::CalculatePricing => pricing::NAME,
            SupportTool::CreateTicket => create_ticket::NAME,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn schema(self) -> ToolSchema {
        match self {
            SupportTool::SearchKnowledgeBase => knowledge_search::schema(),
            SupportTool::CalculatePricing => pricing::schema(),
            SupportTool::CreateTicket => create_ticket::schema(),
        }
    }

    pub fn side_effect(self) -> SideEffect {
        self.schema().side_effect
    }
}

/// Shared tool dependencies; one per process.
pub struct ToolRegistry {
    retriever: Retriever,
    ticket_log: Arc<TicketLog>,
    default_top_k: usize,
    retry: RetryPolicy,
}

impl ToolRegistry {
    pub fn new(retriever: Retriever, ticket_log: Arc<TicketLog>) -> Self {
        Self {
            retriever,
            ticket_log,
            default_top_k: 3,
            retry: RetryPolicy {
                attempt_timeout: Duration::from_secs(30),
                ..RetryPolicy::default()
            },
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k.max(1);
        self
    }

    /// Attempts and backoff for read-only tools. Mutating tools run once.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Per-attempt time limit for read-only tools. Mutating tools always run
    /// to completion.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.retry.attempt_timeout = timeout;
        self
    }

    /// Tool definitions as sent to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        SupportTool::ALL.iter().map(|t| t.schema().to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        SupportTool::ALL.iter().map(|t| t.name()).collect()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn ticket_log(&self) -> &TicketLog {
        &self.ticket_log
    }

    async fn run(
        &self,
        tool: SupportTool,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        match tool {
            SupportTool::SearchKnowledgeBase => {
                knowledge_search::execute(&self.retriever, self.default_top_k, args).await
            }
            SupportTool::CalculatePricing => pricing::execute(args),
            SupportTool::CreateTicket => create_ticket::execute(&self.ticket_log, ctx, args).await,
        }
    }

    async fn run_bounded(
        &self,
        tool: SupportTool,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        if tool.side_effect() == SideEffect::Mutating {
            return self.run(tool, args, ctx).await;
        }

        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match tokio::time::timeout(self.retry.attempt_timeout, self.run(tool, args, ctx)).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(e)) => e,
                Err(_) => ToolError::Timeout {
                    tool_name: tool.name().into(),
                    timeout_secs: self.retry.attempt_timeout.as_secs(),
                },
            };

            if !error.is_transient() || attempt >= attempts {
                return Err(error);
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                tool = tool.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Tool attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub result: ToolResult,
    /// The call id had already run; `result` is the earlier one.
    pub cached: bool,
    pub duration: Duration,
}

/// Per-conversation dispatcher.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    executed: HashMap<String, ToolResult>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            executed: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Number of distinct call ids executed so far.
    pub fn executed(&self) -> usize {
        self.executed.len()
    }

    /// Validate and execute `call`.
    ///
    /// `UnknownTool` and `SchemaValidation` are returned before anything runs
    /// and are not remembered, so a corrected retry with the same id executes.
    /// Execution failures become an unsuccessful [`ToolResult`] and are
    /// remembered like successes. Ticket log failures are returned as errors.
    pub async fn dispatch(&mut self, call: &ToolCall, ctx: &ToolContext) -> Result<Dispatch, ToolError> {
        let started = Instant::now();
        if let Some(prior) = self.executed.get(&call.call_id) {
            if prior.tool_name != call.tool_name {
                warn!(
                    call_id = %call.call_id,
                    tool = %call.tool_name,
                    prior_tool = %prior.tool_name,
                    "Call id reused for a different tool"
                );
                return Err(ToolError::SchemaValidation {
                    tool: call.tool_name.clone(),
                    reason: format!(
                        "call id '{}' was already used for {}",
                        call.call_id, prior.tool_name
                    ),
                });
            }
            debug!(call_id = %call.call_id, tool = %call.tool_name, "Duplicate call id, returning cached result");
            return Ok(Dispatch {
                result: prior.clone(),
                cached: true,
                duration: started.elapsed(),
            });
        }

        let tool = SupportTool::from_name(&call.tool_name)
            .ok_or_else(|| ToolError::UnknownTool(call.tool_name.clone()))?;
        let args = tool.schema().validate(&call.arguments)?;

        let result = match self.registry.run_bounded(tool, &args, ctx).await {
            Ok(output) => ToolResult::ok(call, output.text, output.data),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e @ ToolError::SchemaValidation { .. }) => return Err(e),
            Err(e) => {
                warn!(call_id = %call.call_id, tool = %call.tool_name, error = %e, "Tool execution failed");
                ToolResult::error(call, &e)
            }
        };

        info!(
            session_id = %ctx.session_id,
            call_id = %call.call_id,
            tool = %call.tool_name,
            success = result.success,
            "Tool executed"
        );
        self.executed.insert(call.call_id.clone(), result.clone());
        Ok(Dispatch {
            result,
            cached: false,
            duration: started.elapsed(),
        })
    }
}
