//! The SupportDesk agent: the orchestration loop at the heart of the system.
//!
//! For every user message the agent:
//!
//! 1. **Retrieves** knowledge for the message (plus a condensed copy of the
//!    previous answer)
//! 2. **Generates** with history, retrieved chunks and tool schemas
//! 3. **Executes** the single tool the model asks for, if any, and loops
//!    back to 2 (bounded per user turn)
//! 4. **Responds** with text, an escalation, or an apology when the model
//!    is unreachable
//!
//! Sessions own their conversation and dispatcher; the [`SessionManager`]
//! creates them on first contact and evicts them when idle.

pub mod loop_runner;
pub mod prompt;
pub mod runtime;
pub mod sentiment;
pub mod session;

pub use loop_runner::{AgentLoop, AgentReply, Outcome, Phase};
pub use prompt::Persona;
pub use runtime::{build_agent, build_agent_with, start_sessions};
pub use sentiment::Sentiment;
pub use session::{Session, SessionManager};

#[cfg(test)]
pub(crate) mod test_helpers;
