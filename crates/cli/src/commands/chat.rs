//! `supportdesk chat`: Interactive or single-message support chat.

use std::io::Write;
use std::path::Path;

use supportdesk_agent::{AgentLoop, AgentReply, Outcome, Session};
use supportdesk_config::AppConfig;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use uuid::Uuid;

/// Words that end an interactive chat.
const EXIT_WORDS: &[&str] = &["quit", "exit", "bye"];

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    API_KEY             = 'sk-or-v1-...'");
        eprintln!("    OPENROUTER_API_KEY  = 'sk-or-v1-...'");
        eprintln!("    OPENAI_API_KEY      = 'sk-...'");
        eprintln!();
        eprintln!("  Or add `api_key` to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let agent = supportdesk_agent::build_agent(&config)?;
    let mut session = agent.new_session(Uuid::new_v4().to_string());

    match message {
        Some(message) => {
            let reply = agent.handle(&mut session, &message).await?;
            println!("{}", reply.text);
            if let Some(footer) = footer(&reply) {
                println!("{footer}");
            }
        }
        None => interactive(&agent, &mut session, &config).await?,
    }

    Ok(())
}

async fn interactive(
    agent: &AgentLoop,
    session: &mut Session,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let persona = agent.persona();
    let name = persona.agent_name.clone();
    let chunks = agent.tools().retriever().store().len();

    println!();
    println!("  {} Support: {name}", persona.company_name);
    println!("  Model:     {}", config.provider.model);
    println!("  Knowledge: {chunks} chunks");
    if chunks == 0 {
        println!("  ⚠️  No knowledge store loaded; run `supportdesk ingest <dir>` first.");
    }
    println!("  Type 'quit', 'exit' or 'bye' to leave.");
    println!();
    print_lines(&name, &persona.greeting());

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit_word(input) {
            break;
        }

        // Only unrecoverable failures come back as errors; they end the chat.
        let reply = agent.handle(session, input).await?;
        println!();
        print_lines(&name, &reply.text);
        if let Some(footer) = footer(&reply) {
            println!("  {footer}");
        }
        println!();
    }

    println!();
    print_lines(&name, &persona.farewell());
    println!();
    Ok(())
}

fn print_lines(name: &str, text: &str) {
    for line in text.lines() {
        println!("  {name} > {line}");
    }
}

fn is_exit_word(input: &str) -> bool {
    let word = input.trim().trim_end_matches(['!', '.']);
    EXIT_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word))
}

/// Sources and ticket id shown under a reply.
fn footer(reply: &AgentReply) -> Option<String> {
    let mut parts = Vec::new();
    if !reply.sources.is_empty() {
        parts.push(format!("Sources: {}", reply.sources.join(", ")));
    }
    if let Some(id) = &reply.ticket_id {
        parts.push(format!("Ticket: {id}"));
    }
    if reply.outcome == Outcome::ModelUnavailable {
        parts.push("(model unavailable)".to_string());
    }
    (!parts.is_empty()).then(|| format!("[{}]", parts.join(" | ")))
}
