//! Error types for the SupportDesk domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; they fold into [`Error`].

use thiserror::Error;

/// The top-level error type for all SupportDesk operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model boundary ---
    #[error("Model call error: {0}")]
    Provider(#[from] ProviderError),

    // --- Retrieval ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Knowledge store ---
    #[error("Knowledge store error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Tools ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Ticket log ---
    #[error("Ticket log error: {0}")]
    TicketLog(#[from] TicketLogError),

    // --- Conversation invariants ---
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    /// Loop guard: the model kept requesting tools past the per-turn bound.
    #[error("Tool execution bound exceeded after {limit} invocations")]
    ToolBoundExceeded { limit: u32 },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must terminate the session rather than be
    /// reported back to the model or the user.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::TicketLog(_) => true,
            Error::Tool(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures at the language-model boundary.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Transient failures are worth retrying; configuration and credential
    /// failures are not.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::NotConfigured(_)
        )
    }
}

/// Failures while answering a retrieval query.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Knowledge store is empty")]
    EmptyIndex,

    #[error("Embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding generation failed: {0}")]
    Embedding(String),
}

/// Failures while loading, building, or saving the knowledge store.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Failed to parse knowledge index {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Index was built with embedder '{index}', runtime uses '{runtime}'")]
    EmbedderMismatch { index: String, runtime: String },

    #[error("Ingestion failed: {0}")]
    Ingestion(String),
}

/// Failures while validating or executing a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    SchemaValidation { tool: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool backend unavailable: {tool_name}: {reason}")]
    Unavailable { tool_name: String, reason: String },

    #[error(transparent)]
    TicketLog(#[from] TicketLogError),
}

impl ToolError {
    /// A ticket that cannot be persisted is unrecoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::TicketLog(_))
    }

    /// Failures that may succeed on another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Timeout { .. } | ToolError::Unavailable { .. })
    }
}

/// Failures of the durable ticket log.
#[derive(Debug, Clone, Error)]
pub enum TicketLogError {
    #[error("Ticket log I/O failure at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to serialize ticket: {0}")]
    Serialization(String),

    #[error("Corrupt ticket record at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

/// Violations of the conversation ordering invariant.
#[derive(Debug, Clone, Error)]
pub enum ConversationError {
    #[error("Tool turn for call '{call_id}' does not follow a matching assistant tool call")]
    OrphanToolTurn { call_id: String },

    #[error("Tool turn is missing its tool result")]
    MissingToolResult,
}
