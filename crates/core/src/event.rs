//! Domain event system: decoupled observation of what the agent does.
//!
//! Events are published when something interesting happens in a session.
//! Other components (the gateway, tests) can subscribe without coupling to
//! the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A user message entered the loop
    TurnStarted {
        session_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// Retrieval finished for a user turn
    KnowledgeRetrieved {
        session_id: String,
        hits: usize,
        top_score: Option<f32>,
        timestamp: DateTime<Utc>,
    },

    /// A tool was dispatched
    ToolExecuted {
        session_id: String,
        call_id: String,
        tool_name: String,
        success: bool,
        cached: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A ticket reached the ticket log
    TicketCreated {
        session_id: String,
        ticket_id: String,
        severity: String,
        timestamp: DateTime<Utc>,
    },

    /// The agent produced its reply for a turn
    ResponseGenerated {
        session_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A model call attempt failed
    ModelCallFailed {
        session_id: String,
        attempt: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            session_id: "s-1".into(),
            call_id: "call_1".into(),
            tool_name: "create_ticket".into(),
            success: true,
            cached: false,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, cached, ..
            } => {
                assert_eq!(tool_name, "create_ticket");
                assert!(!cached);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
