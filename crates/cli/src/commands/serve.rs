//! `supportdesk serve`: Start the HTTP API server.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port: Option<u16>,
    host: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(host) = host {
        config.gateway.host = host;
    }

    println!("🛎️  SupportDesk Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.provider.model);
    println!("   Index:     {}", config.retrieval.index_path.display());

    supportdesk_gateway::start(config).await
}
