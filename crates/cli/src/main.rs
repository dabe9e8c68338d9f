//! SupportDesk CLI, the main entry point.
//!
//! Commands:
//! - `ingest`:   Build the knowledge store from a document directory
//! - `chat`:     Interactive or single-message support chat
//! - `serve`:    Start the HTTP gateway
//! - `tickets`:  List escalated tickets
//! - `config`:   Write, show or locate the configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "supportdesk",
    about = "SupportDesk: retrieval-augmented customer support agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.supportdesk/config.toml)
    #[arg(short, long, global = true, env = "SUPPORTDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and store a directory of documents
    Ingest {
        /// Document directory or single file
        source: PathBuf,

        /// Where to write the knowledge store (overrides INDEX_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Chat with the support agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// List tickets in the ticket log
    Tickets {
        /// Print raw JSON records
        #[arg(long)]
        json: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Chat owns the terminal; keep the log quiet unless asked.
    let quiet = matches!(cli.command, Commands::Chat { .. });
    init_tracing(cli.verbose, cli.json_logs, quiet);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Ingest { source, output } => {
            commands::ingest::run(config, &source, output).await?
        }
        Commands::Chat { message } => commands::chat::run(config, message).await?,
        Commands::Serve { port, host } => commands::serve::run(config, port, host).await?,
        Commands::Tickets { json } => commands::tickets::run(config, json).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init(config)?,
            ConfigAction::Show => commands::config_cmd::show(config)?,
            ConfigAction::Path => commands::config_cmd::path(config),
        },
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool, quiet: bool) {
    let level = match (verbose, quiet) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
