//! Ticket escalation tool: hands the issue to Tier-2 support.

use serde_json::{Map, Value, json};
use supportdesk_core::error::ToolError;
use supportdesk_core::ticket::{Severity, Ticket};
use supportdesk_core::tool::{FieldKind, FieldSpec, SideEffect, ToolSchema};

use crate::ticket_log::TicketLog;
use crate::{ToolContext, ToolOutput};

pub const NAME: &str = "create_ticket";

pub fn schema() -> ToolSchema {
    ToolSchema {
        name: NAME.into(),
        description: "File a support ticket for escalation to Tier-2 support. Use this ONLY when \
                      the documentation cannot answer the question or the issue needs a human. \
                      Severity levels: 'low', 'medium', 'high'."
            .into(),
        side_effect: SideEffect::Mutating,
        fields: vec![
            FieldSpec::required("summary", FieldKind::String, "Brief summary of the issue"),
            FieldSpec::optional("severity", FieldKind::String, "Severity level (default medium)")
                .one_of(&["low", "medium", "high"]),
        ],
    }
}

pub async fn execute(
    log: &TicketLog,
    ctx: &ToolContext,
    args: &Map<String, Value>,
) -> Result<ToolOutput, ToolError> {
    let summary = args
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::SchemaValidation {
            tool: NAME.into(),
            reason: "field 'summary' must not be empty".into(),
        })?;
    let severity = args
        .get("severity")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Severity>().ok())
        .unwrap_or_default();

    let ticket = Ticket::new(
        summary,
        severity,
        ctx.conversation_excerpt.clone(),
        ctx.session_id.clone(),
    );
    let id = log.append(&ticket).await?;

    let text = format!(
        "Ticket Escalated Successfully!\n\
         Ticket ID: {id}\n\
         Severity: {}\n\
         Summary: {summary}\n\
         Status: Open\n\
         A Tier-2 support representative will contact you shortly.",
        severity.as_str().to_uppercase()
    );

    Ok(ToolOutput {
        text,
        data: Some(json!({
            "ticket_id": id,
            "severity": severity,
            "status": ticket.status,
        })),
    })
}
