//! `supportdesk config`: Configuration management commands.

use std::path::{Path, PathBuf};

use supportdesk_config::AppConfig;

fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Write the default configuration unless a file already exists.
pub fn init(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_file(path);
    if write_default(&path)? {
        println!("✅ Wrote default config to {}", path.display());
        println!("   Set API_KEY, then run `supportdesk ingest <docs>`.");
    } else {
        println!("  Config already exists: {}", path.display());
    }
    Ok(())
}

fn write_default(path: &Path) -> Result<bool, std::io::Error> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}

/// Print the effective configuration, environment overrides included.
pub fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;
    println!("{}", render(config)?);
    Ok(())
}

fn render(mut config: AppConfig) -> Result<String, toml::ser::Error> {
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&config)
}

pub fn path(path: Option<&Path>) {
    println!("{}", config_file(path).display());
}
