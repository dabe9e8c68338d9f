//! Tools available to the SupportDesk agent.
//!
//! The set is fixed: knowledge search, pricing, and ticket escalation.
//! Arguments are validated against each tool's declared schema before
//! anything runs; tickets land in the durable [`TicketLog`].

pub mod create_ticket;
pub mod knowledge_search;
pub mod pricing;
pub mod registry;
pub mod ticket_log;

use serde_json::Value;

pub use registry::{Dispatch, SupportTool, ToolDispatcher, ToolRegistry};
pub use ticket_log::TicketLog;

/// What a tool produced, before it is tied to a call id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Text the model reads
    pub text: String,
    pub data: Option<Value>,
}

/// Per-call facts a tool may need about the conversation it runs in.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub conversation_excerpt: String,
}
