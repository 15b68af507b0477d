//! Shared Application State
//!
//! `AppState` holds the tutoring core, the optional database, and the single
//! server-held session used by the stateful endpoints.

use crate::{
    db::Db,
    models::{ChatEntry, MessageRole, SessionSnapshot},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tutor_core::session::{SessionContext, SessionMachine, TurnResponse};

/// Oldest entries are dropped beyond this many.
pub const MAX_HISTORY: usize = 100;

/// The server-held session: context plus chat history.
#[derive(Debug, Default)]
pub struct ServerSession {
    pub context: SessionContext,
    pub history: Vec<ChatEntry>,
}

impl ServerSession {
    pub fn record(&mut self, role: MessageRole, content: impl Into<String>) {
        self.history.push(ChatEntry::new(role, content));
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            context: self.context.clone(),
            history: self.history.clone(),
        }
    }
}

impl From<SessionSnapshot> for ServerSession {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            context: snapshot.context,
            history: snapshot.history,
        }
    }
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub machine: SessionMachine,
    pub db: Option<Arc<Db>>,
    /// Turns on the stateful endpoints run one at a time under this lock.
    pub session: Mutex<ServerSession>,
}

impl AppState {
    pub fn new(machine: SessionMachine, db: Option<Arc<Db>>) -> Self {
        Self {
            machine,
            db,
            session: Mutex::new(ServerSession::default()),
        }
    }

    /// Like `new`, but resumes the learner's saved session when a database is configured.
    pub async fn restore(machine: SessionMachine, db: Option<Arc<Db>>) -> Self {
        let state = Self::new(machine, db);
        if let Some(db) = &state.db {
            let learner = &state.machine.config().learner_id;
            match db.load_snapshot(learner).await {
                Ok(Some(snapshot)) => {
                    info!(%learner, entries = snapshot.history.len(), "Restored saved session");
                    *state.session.lock().await = snapshot.into();
                }
                Ok(None) => {}
                Err(e) => warn!(error = ?e, "Failed to load saved session, starting fresh"),
            }
        }
        state
    }

    /// Records both sides of a turn and saves the snapshot.
    pub async fn commit_turn(
        &self,
        session: &mut ServerSession,
        message: &str,
        response: &TurnResponse,
        context: SessionContext,
    ) {
        session.context = context;
        session.record(MessageRole::User, message);
        session.record(MessageRole::Tutor, response.text.as_str());
        self.persist(session).await;
    }

    pub async fn persist(&self, session: &ServerSession) {
        if let Some(db) = &self.db {
            let learner = &self.machine.config().learner_id;
            if let Err(e) = db.save_snapshot(learner, &session.snapshot()).await {
                warn!(error = ?e, "Failed to save session snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_capped() {
        let mut session = ServerSession::default();
        for i in 0..(MAX_HISTORY + 5) {
            session.record(MessageRole::User, format!("message {i}"));
        }
        assert_eq!(session.history.len(), MAX_HISTORY);
        assert_eq!(session.history[0].content, "message 5");
        assert_eq!(
            session.history.last().map(|e| e.content.as_str()),
            Some("message 104")
        );
    }

    #[test]
    fn snapshot_round_trips_into_session() {
        let mut session = ServerSession::default();
        session.context.target_topic = "Gravity".to_string();
        session.record(MessageRole::Tutor, "hello");

        let restored = ServerSession::from(session.snapshot());
        assert_eq!(restored.context, session.context);
        assert_eq!(restored.history, session.history);
    }
}
