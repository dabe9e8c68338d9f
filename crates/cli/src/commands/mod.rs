pub mod chat;
pub mod config_cmd;
pub mod ingest;
pub mod serve;
pub mod tickets;

use std::path::Path;

use supportdesk_config::AppConfig;

/// Load the configuration every command starts from.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}").into())
}
