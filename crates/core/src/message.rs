//! Turn and Conversation domain types.
//!
//! A conversation is append-only and owned by exactly one session. Every
//! `tool` turn must directly follow the assistant turn that requested it;
//! [`Conversation::push`] enforces this on every append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConversationError;
use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The support agent
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who produced this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool invocation requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    /// Tool output (only on `tool` turns)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_call: None,
            tool_result: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// Create a new assistant text turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// Create an assistant turn that requests a tool.
    pub fn assistant_tool_call(content: impl Into<String>, call: ToolCall) -> Self {
        let mut turn = Self::new(Role::Assistant, content.into());
        turn.tool_call = Some(call);
        turn
    }

    /// Create a tool turn carrying a result.
    pub fn tool(result: ToolResult) -> Self {
        let mut turn = Self::new(Role::Tool, result.output.clone());
        turn.tool_result = Some(result);
        turn
    }

    /// The call id this turn requests (assistant) or answers (tool).
    pub fn call_id(&self) -> Option<&str> {
        match self.role {
            Role::Assistant => self.tool_call.as_ref().map(|c| c.call_id.as_str()),
            Role::Tool => self.tool_result.as_ref().map(|r| r.call_id.as_str()),
            Role::User => None,
        }
    }
}

/// A conversation is an ordered, append-only sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered turns
    turns: Vec<Turn>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        Self::with_id(ConversationId::new())
    }

    pub fn with_id(id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn, rejecting a `tool` turn that does not answer the
    /// immediately preceding assistant tool call.
    pub fn push(&mut self, turn: Turn) -> Result<(), ConversationError> {
        if turn.role == Role::Tool {
            let Some(result) = &turn.tool_result else {
                return Err(ConversationError::MissingToolResult);
            };
            let matches_previous = self
                .turns
                .last()
                .filter(|prev| prev.role == Role::Assistant)
                .and_then(|prev| prev.call_id())
                == Some(result.call_id.as_str());
            if !matches_previous {
                return Err(ConversationError::OrphanToolTurn {
                    call_id: result.call_id.clone(),
                });
            }
        }
        self.updated_at = Utc::now();
        self.turns.push(turn);
        Ok(())
    }

    /// Commit an assistant tool call together with its result.
    ///
    /// Both turns land or neither does, so the conversation never holds a
    /// dangling call.
    pub fn push_tool_exchange(
        &mut self,
        call_turn: Turn,
        result: ToolResult,
    ) -> Result<(), ConversationError> {
        if call_turn.call_id() != Some(result.call_id.as_str()) {
            return Err(ConversationError::OrphanToolTurn {
                call_id: result.call_id,
            });
        }
        self.push(call_turn)?;
        self.push(Turn::tool(result))
    }

    /// Whether every tool turn directly follows its matching assistant call.
    pub fn is_consistent(&self) -> bool {
        self.turns.iter().enumerate().all(|(i, turn)| {
            if turn.role != Role::Tool {
                return true;
            }
            let Some(prev) = i.checked_sub(1).map(|p| &self.turns[p]) else {
                return false;
            };
            prev.role == Role::Assistant && prev.call_id().is_some() && prev.call_id() == turn.call_id()
        })
    }

    /// The most recent user message.
    pub fn last_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }

    /// The most recent assistant answer (turns that request tools are skipped).
    pub fn last_assistant_answer(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant && t.tool_call.is_none())
            .map(|t| t.content.as_str())
    }

    /// A short plain-text excerpt of the latest user/assistant exchanges.
    pub fn excerpt(&self, max_turns: usize, max_chars: usize) -> String {
        let recent: Vec<&Turn> = self
            .turns
            .iter()
            .rev()
            .filter(|t| t.role != Role::Tool && !t.content.trim().is_empty())
            .take(max_turns)
            .collect();

        let mut out = String::new();
        for turn in recent.into_iter().rev() {
            let label = match turn.role {
                Role::User => "user",
                _ => "assistant",
            };
            out.push_str(&format!("{label}: {}\n", turn.content.trim()));
        }
        truncate_chars(out.trim_end(), max_chars)
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.content.len() / 4).sum()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "create_ticket", json!({"summary": "x"}))
    }

    fn result(id: &str) -> ToolResult {
        ToolResult::ok(&call(id), "Ticket TKT-1 created", None)
    }

    #[test]
    fn create_user_turn() {
        let turn = Turn::user("Hello, agent!");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "Hello, agent!");
        assert!(turn.tool_call.is_none());
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Turn::user("First message")).unwrap();
        assert_eq!(conv.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn tool_turn_without_matching_call_is_rejected() {
        let mut conv = Conversation::new();
        conv.push(Turn::user("help")).unwrap();
        let err = conv.push(Turn::tool(result("call_1"))).unwrap_err();
        assert!(matches!(err, ConversationError::OrphanToolTurn { .. }));
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn tool_turn_with_mismatched_id_is_rejected() {
        let mut conv = Conversation::new();
        conv.push(Turn::assistant_tool_call("", call("call_1"))).unwrap();
        assert!(conv.push(Turn::tool(result("call_2"))).is_err());
    }

    #[test]
    fn tool_exchange_commits_both_turns() {
        let mut conv = Conversation::new();
        conv.push(Turn::user("urgent")).unwrap();
        conv.push_tool_exchange(Turn::assistant_tool_call("", call("call_1")), result("call_1"))
            .unwrap();
        assert_eq!(conv.len(), 3);
        assert!(conv.is_consistent());
        assert_eq!(conv.turns()[2].call_id(), Some("call_1"));
    }

    #[test]
    fn mismatched_exchange_commits_nothing() {
        let mut conv = Conversation::new();
        let err = conv
            .push_tool_exchange(Turn::assistant_tool_call("", call("call_1")), result("call_9"))
            .unwrap_err();
        assert!(matches!(err, ConversationError::OrphanToolTurn { .. }));
        assert!(conv.is_empty());
    }

    #[test]
    fn last_answer_skips_tool_requests() {
        let mut conv = Conversation::new();
        conv.push(Turn::user("q1")).unwrap();
        conv.push(Turn::assistant("a1")).unwrap();
        conv.push(Turn::user("q2")).unwrap();
        conv.push(Turn::assistant_tool_call("checking", call("c"))).unwrap();
        assert_eq!(conv.last_user_message(), Some("q2"));
        assert_eq!(conv.last_assistant_answer(), Some("a1"));
    }

    #[test]
    fn excerpt_keeps_latest_turns_in_order() {
        let mut conv = Conversation::new();
        conv.push(Turn::user("first")).unwrap();
        conv.push(Turn::assistant("second")).unwrap();
        conv.push(Turn::user("third")).unwrap();
        let excerpt = conv.excerpt(2, 500);
        assert_eq!(excerpt, "assistant: second\nuser: third");
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate_chars("abcdef", 4), "abc…");
        assert_eq!(truncate_chars("abc", 4), "abc");
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::assistant_tool_call("", call("call_7"));
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.call_id(), Some("call_7"));
        assert_eq!(back.role, Role::Assistant);
    }

    #[test]
    fn conversation_token_estimate() {
        let mut conv = Conversation::new();
        // 20 chars ≈ 5 tokens
        conv.push(Turn::user("12345678901234567890")).unwrap();
        assert_eq!(conv.estimated_tokens(), 5);
    }
}
