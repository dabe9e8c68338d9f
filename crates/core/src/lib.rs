//! # SupportDesk Core
//!
//! Domain types, traits, and error definitions for the SupportDesk
//! retrieval-augmented support agent. This crate has **no framework
//! dependencies**: it defines the model that every other crate implements
//! against.
//!
//! ## Layout
//!
//! - [`message`]: turns and conversations
//! - [`tool`]: tool calls, results, and argument schemas
//! - [`provider`]: the language-model boundary
//! - [`knowledge`]: knowledge chunks, retrieval results, embedders
//! - [`ticket`]: escalation tickets
//! - [`event`]: domain events

pub mod error;
pub mod event;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod ticket;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use knowledge::{Embedder, KnowledgeChunk, RetrievalResult, ScoredChunk, Similarity};
pub use message::{Conversation, ConversationId, Role, Turn};
pub use provider::{ModelReply, ModelRequest, Provider, ProviderResponse};
pub use ticket::{Severity, Ticket, TicketId, TicketStatus};
pub use tool::{FieldKind, FieldSpec, SideEffect, ToolCall, ToolResult, ToolSchema};
