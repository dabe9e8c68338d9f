//! Escalation tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ticket identifier of the form `TKT-YYYYMMDDHHMMSS-xxxxxx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub String);

impl TicketId {
    /// Generate an id for a ticket created at `at`.
    ///
    /// The random suffix keeps ids unique when two tickets land in the same
    /// second.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("TKT-{}-{}", at.format("%Y%m%d%H%M%S"), &suffix[..6]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Closed => "closed",
        }
    }
}

/// An escalated issue, handed to human (Tier-2) support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub created_at: DateTime<Utc>,
    pub summary: String,
    pub conversation_excerpt: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub session_id: String,
}

impl Ticket {
    /// Build an open ticket; the id is fixed here, before any write.
    pub fn new(
        summary: impl Into<String>,
        severity: Severity,
        conversation_excerpt: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: TicketId::generate(created_at),
            created_at,
            summary: summary.into(),
            conversation_excerpt: conversation_excerpt.into(),
            status: TicketStatus::Open,
            severity,
            session_id: session_id.into(),
        }
    }
}
