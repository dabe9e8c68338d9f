//! Sessions: one conversation plus its dispatcher, keyed by session id.
//!
//! A session is created on its first message and evicted once it has been
//! idle longer than the configured timeout. Each session sits behind its own
//! async mutex, so a session runs one model call or dispatch at a time while
//! different sessions proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use supportdesk_config::SessionsConfig;
use supportdesk_core::error::Error;
use supportdesk_core::message::{Conversation, ConversationId};
use supportdesk_tools::{ToolDispatcher, ToolRegistry};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::loop_runner::{AgentLoop, AgentReply};

pub struct Session {
    pub id: String,
    pub conversation: Conversation,
    pub dispatcher: ToolDispatcher,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        let id = id.into();
        Self {
            conversation: Conversation::with_id(ConversationId(id.clone())),
            dispatcher: ToolDispatcher::new(tools),
            created_at: Utc::now(),
            id,
        }
    }
}

struct Entry {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

impl Entry {
    /// Nobody is running a turn on this session right now.
    fn is_idle(&self) -> bool {
        self.session.try_lock().is_ok()
    }
}

pub struct SessionManager {
    agent: Arc<AgentLoop>,
    sessions: Mutex<HashMap<String, Entry>>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(agent: Arc<AgentLoop>, idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            agent,
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn from_config(agent: Arc<AgentLoop>, config: &SessionsConfig) -> Self {
        Self::new(
            agent,
            Duration::from_secs(config.idle_timeout_secs),
            config.max_sessions,
        )
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    /// Route `message` to its session, creating the session when needed.
    ///
    /// Returns the session id with the reply. A fatal error ends the session.
    pub async fn chat(&self, session_id: Option<&str>, message: &str) -> Result<(String, AgentReply), Error> {
        let (id, session) = self.session(session_id).await;

        let result = {
            let mut session = session.lock().await;
            self.agent.handle(&mut session, message).await
        };
        self.touch(&id).await;

        match result {
            Ok(reply) => Ok((id, reply)),
            Err(e) => {
                if e.is_fatal() {
                    warn!(session_id = %id, error = %e, "Fatal error, ending session");
                    self.end(&id).await;
                }
                Err(e)
            }
        }
    }

    /// The session for `session_id`, created if absent. `None` mints a new id.
    pub async fn session(&self, session_id: Option<&str>) -> (String, Arc<Mutex<Session>>) {
        let mut sessions = self.sessions.lock().await;
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(entry) = sessions.get_mut(&id) {
            entry.last_seen = Instant::now();
            return (id, entry.session.clone());
        }

        if sessions.len() >= self.max_sessions {
            self.make_room(&mut sessions);
        }

        let session = Arc::new(Mutex::new(self.agent.new_session(id.clone())));
        sessions.insert(
            id.clone(),
            Entry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        debug!(session_id = %id, active = sessions.len(), "Session created");
        (id, session)
    }

    /// Drop a session. Returns whether it existed.
    pub async fn end(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict sessions idle past the timeout. Returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let timeout = self.idle_timeout;
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= timeout || !entry.is_idle());
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, active = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Run [`sweep`](Self::sweep) every `every` until the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.sweep().await;
            }
        })
    }

    async fn touch(&self, session_id: &str) {
        if let Some(entry) = self.sessions.lock().await.get_mut(session_id) {
            entry.last_seen = Instant::now();
        }
    }

    /// Make space for one more session: drop expired sessions first, then
    /// the least recently seen idle one.
    fn make_room(&self, sessions: &mut HashMap<String, Entry>) {
        let timeout = self.idle_timeout;
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= timeout || !entry.is_idle());
        if sessions.len() < self.max_sessions {
            return;
        }

        let oldest = sessions
            .iter()
            .filter(|(_, entry)| entry.is_idle())
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                sessions.remove(&id);
                debug!(session_id = %id, "Evicted least recently used session");
            }
            None => warn!(
                max_sessions = self.max_sessions,
                "Every session is busy, exceeding the session limit"
            ),
        }
    }
}
