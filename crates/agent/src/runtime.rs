//! Runtime wiring: config → provider, knowledge store, tools, agent.
//!
//! Every front end (terminal chat, HTTP gateway) builds its agent here so
//! the shared pieces are constructed once and handed out behind `Arc`.

use std::sync::Arc;
use std::time::Duration;

use supportdesk_config::AppConfig;
use supportdesk_core::error::Error;
use supportdesk_core::event::EventBus;
use supportdesk_core::provider::Provider;
use supportdesk_knowledge::{KnowledgeStore, Retriever, embedder};
use supportdesk_providers::{OpenAiCompatProvider, RetryPolicy};
use supportdesk_tools::{TicketLog, ToolRegistry};
use tracing::info;

use crate::loop_runner::AgentLoop;
use crate::session::SessionManager;

/// Build the agent from configuration with the configured provider.
pub fn build_agent(config: &AppConfig) -> Result<Arc<AgentLoop>, Error> {
    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(config)?);
    build_agent_with(config, provider, Arc::new(EventBus::default()))
}

/// Build the agent around an existing provider.
pub fn build_agent_with(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    event_bus: Arc<EventBus>,
) -> Result<Arc<AgentLoop>, Error> {
    let embedder = embedder::from_config(config, Some(provider.clone()))?;
    let store = KnowledgeStore::open(&config.retrieval.index_path, embedder.as_ref())?;
    let retriever = Retriever::new(Arc::new(store), embedder, config.retrieval.similarity);
    let ticket_log = Arc::new(TicketLog::open(&config.tickets.log_path)?);

    let tools = ToolRegistry::new(retriever, ticket_log)
        .with_top_k(config.retrieval.top_k)
        .with_retry(RetryPolicy::from_config(config))
        .with_timeout(Duration::from_secs(config.agent.tool_timeout_secs));

    info!(
        provider = provider.name(),
        model = %config.provider.model,
        chunks = tools.retriever().store().len(),
        tickets = %config.tickets.log_path.display(),
        "Agent ready"
    );

    Ok(Arc::new(AgentLoop::from_config(
        config,
        provider,
        Arc::new(tools),
        event_bus,
    )))
}

/// Session manager for `agent`, with its idle sweeper running.
pub fn start_sessions(agent: Arc<AgentLoop>, config: &AppConfig) -> Arc<SessionManager> {
    let sessions = Arc::new(SessionManager::from_config(agent, &config.sessions));
    sessions.spawn_sweeper(Duration::from_secs(config.sessions.sweep_interval_secs.max(1)));
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StaticProvider;

    fn config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.retrieval.index_path = dir.join("index.json");
        config.tickets.log_path = dir.join("tickets.log");
        config
    }

    #[test]
    fn missing_api_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_agent(&config(dir.path())).err().unwrap();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn agent_builds_without_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let agent = build_agent_with(
            &config(dir.path()),
            Arc::new(StaticProvider::text("hello")),
            Arc::new(EventBus::default()),
        )
        .unwrap();
        assert!(agent.tools().retriever().store().is_empty());
        assert_eq!(agent.persona().agent_name, "Mynko");
    }

    #[tokio::test]
    async fn unreadable_ticket_log_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        std::fs::write(dir.path().join("tickets.log"), "").unwrap();
        config.tickets.log_path = dir.path().to_path_buf();
        let result = build_agent_with(
            &config,
            Arc::new(StaticProvider::text("hello")),
            Arc::new(EventBus::default()),
        );
        assert!(matches!(result, Err(Error::TicketLog(_))));
    }
}
