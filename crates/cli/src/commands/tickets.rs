//! `supportdesk tickets`: List the ticket log.

use std::path::Path;

use supportdesk_core::ticket::Ticket;
use supportdesk_tools::TicketLog;

pub async fn run(config_path: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let log = TicketLog::open(&config.tickets.log_path)?;
    let tickets = log.list().await?;

    if json {
        for ticket in &tickets {
            println!("{}", serde_json::to_string(ticket)?);
        }
        return Ok(());
    }

    println!("🎫 Tickets ({}) in {}", tickets.len(), log.path().display());
    if tickets.is_empty() {
        println!("   No tickets yet.");
    }
    for ticket in &tickets {
        println!("{}", summary_line(ticket));
    }
    Ok(())
}

fn summary_line(ticket: &Ticket) -> String {
    format!(
        "   {}  {:<6}  {:<8}  {}  {}",
        ticket.id,
        ticket.severity.as_str().to_uppercase(),
        ticket.status.as_str(),
        ticket.created_at.format("%Y-%m-%d %H:%M"),
        ticket.summary
    )
}
