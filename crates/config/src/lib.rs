//! Configuration loading, validation, and management for SupportDesk.
//!
//! Loads configuration from `~/.supportdesk/config.toml` (or an explicit
//! path) with environment variable overrides. Validates all settings at
//! startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use supportdesk_core::Similarity;

/// The root configuration structure.
///
/// Maps directly to `~/.supportdesk/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Language model endpoint and generation settings
    #[serde(default)]
    pub provider: ProviderSection,

    /// Knowledge store, chunking and retrieval
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Agent loop bounds and persona
    #[serde(default)]
    pub agent: AgentConfig,

    /// Ticket log
    #[serde(default)]
    pub tickets: TicketsConfig,

    /// Session lifecycle
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("retrieval", &self.retrieval)
            .field("agent", &self.agent)
            .field("tickets", &self.tickets)
            .field("sessions", &self.sessions)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Used when `retrieval.embedder = "provider"`
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-attempt timeout for model and embedding calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "openai/text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Which embedder builds and queries the knowledge store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Local feature hashing, no network
    #[default]
    Hashing,
    /// The provider's `/embeddings` endpoint
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Knowledge store file
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub similarity: Similarity,

    /// Characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default)]
    pub embedder: EmbedderKind,

    /// Vector length for the hashing embedder
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_index_path() -> PathBuf {
    AppConfig::config_dir().join("knowledge_index.json")
}
fn default_top_k() -> usize {
    3
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_dimension() -> usize {
    384
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            top_k: default_top_k(),
            similarity: Similarity::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedder: EmbedderKind::default(),
            dimension: default_dimension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool dispatches allowed per user turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Attempts per model call, including the first
    #[serde(default = "default_model_attempts")]
    pub model_attempts: u32,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_company_name")]
    pub company_name: String,

    #[serde(default = "default_agent_name")]
    pub agent_name: String,
}

fn default_max_tool_iterations() -> u32 {
    3
}
fn default_model_attempts() -> u32 {
    3
}
fn default_backoff_initial_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    4000
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_company_name() -> String {
    "NebulaSoft".into()
}
fn default_agent_name() -> String {
    "Mynko".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            model_attempts: default_model_attempts(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            tool_timeout_secs: default_tool_timeout_secs(),
            company_name: default_company_name(),
            agent_name: default_agent_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketsConfig {
    #[serde(default = "default_ticket_log_path")]
    pub log_path: PathBuf,
}

fn default_ticket_log_path() -> PathBuf {
    AppConfig::config_dir().join("tickets.log")
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            log_path: default_ticket_log_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Sessions idle longer than this are dropped
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    1800
}
fn default_max_sessions() -> usize {
    1000
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            max_sessions: default_max_sessions(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.supportdesk/config.toml).
    ///
    /// Environment overrides:
    /// - `API_KEY`, then `SUPPORTDESK_API_KEY`, `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    /// - `INDEX_PATH`
    /// - `TICKET_LOG_PATH`
    /// - `SUPPORTDESK_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from an explicit path when given, else the default path, then
    /// apply environment overrides.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = non_empty("SUPPORTDESK_API_KEY")
                .or_else(|| non_empty("OPENROUTER_API_KEY"))
                .or_else(|| non_empty("OPENAI_API_KEY"));
        }

        if let Some(path) = non_empty("INDEX_PATH") {
            self.retrieval.index_path = PathBuf::from(path);
        }

        if let Some(path) = non_empty("TICKET_LOG_PATH") {
            self.tickets.log_path = PathBuf::from(path);
        }

        if let Some(model) = non_empty("SUPPORTDESK_MODEL") {
            self.provider.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".supportdesk")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return fail("provider.temperature must be between 0.0 and 2.0");
        }
        if self.provider.timeout_secs == 0 {
            return fail("provider.timeout_secs must be > 0");
        }
        if self.retrieval.top_k == 0 {
            return fail("retrieval.top_k must be at least 1");
        }
        if self.retrieval.chunk_size == 0 {
            return fail("retrieval.chunk_size must be > 0");
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return fail("retrieval.chunk_overlap must be smaller than retrieval.chunk_size");
        }
        if self.retrieval.dimension == 0 {
            return fail("retrieval.dimension must be > 0");
        }
        if self.agent.model_attempts == 0 {
            return fail("agent.model_attempts must be at least 1");
        }
        if self.agent.max_tool_iterations == 0 {
            return fail("agent.max_tool_iterations must be at least 1");
        }
        if self.agent.backoff_initial_ms > self.agent.backoff_max_ms {
            return fail("agent.backoff_initial_ms must not exceed agent.backoff_max_ms");
        }
        if self.sessions.max_sessions == 0 {
            return fail("sessions.max_sessions must be at least 1");
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for supportdesk_core::Error {
    fn from(e: ConfigError) -> Self {
        supportdesk_core::Error::Config {
            message: e.to_string(),
        }
    }
}
