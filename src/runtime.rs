//! Runtime for executing sessions
//!
//! `SessionManager` is the single entry point the HTTP layer talks to. It
//! keeps one async mutex per session: a message turn takes it with
//! `try_lock` (a second concurrent message is rejected, never queued) while
//! clear and model updates wait for it. Reads bypass the lock and see only
//! committed states.

mod error;
mod executor;
pub mod traits;
mod turn;

#[cfg(test)]
pub mod testing;

pub use error::SessionError;
pub use traits::*;
pub use turn::{TurnError, TurnOutput, TurnProcessor, TOOL_FALLBACK_REPLY};

use crate::db::{title_from_message, SessionInfo, DEFAULT_TITLE};
use crate::llm::LlmService;
use crate::state_machine::{Event, Message, Role, SessionState};
use executor::SessionExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Parameters for creating (or retitling) a session
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub session_id: Option<String>,
    pub title: Option<String>,
    pub first_message: Option<String>,
}

/// Manager for all sessions
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    turns: TurnProcessor,
    default_model: String,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmService>,
        tools: Arc<dyn ToolExecutor>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            turns: TurnProcessor::new(llm, tools),
            default_model: default_model.into(),
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the lock guarding a session's turns
    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(session_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn fresh_state(&self, session_id: &str) -> SessionState {
        SessionState::new(session_id, self.default_model.clone())
    }

    /// Current state of a session, creating it on first access
    pub async fn get_state(&self, session_id: &str) -> Result<SessionState, SessionError> {
        Ok(self.store.load_or_init(&self.fresh_state(session_id)).await?)
    }

    /// Load a session for a caller holding its lock.
    ///
    /// No turn can be in flight while the lock is held, so a stored
    /// `is_processing` flag is left over from a commit that failed and is
    /// cleared here.
    async fn load_locked(&self, session_id: &str) -> Result<SessionState, SessionError> {
        let mut state = self.get_state(session_id).await?;
        if state.is_processing {
            tracing::warn!(session_id = %session_id, "Clearing stale processing flag");
            state.is_processing = false;
        }
        Ok(state)
    }

    /// Run one user turn
    pub async fn handle_message(
        &self,
        session_id: &str,
        text: &str,
        model: Option<String>,
    ) -> Result<SessionState, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let lock = self.session_lock(session_id).await;
        let Ok(_guard) = lock.try_lock() else {
            tracing::info!(session_id = %session_id, "Rejecting message, session busy");
            return Err(SessionError::Busy);
        };

        let state = self.load_locked(session_id).await?;
        let first_user_message = !state.messages.iter().any(|m| m.role == Role::User);

        let event = Event::UserMessage {
            message: Message::user(text),
            model,
        };
        let result = SessionExecutor::new(state, self.store.as_ref(), &self.turns)
            .run(event)
            .await;

        // The user message is committed even when the turn fails
        if first_user_message && !matches!(result, Err(SessionError::Busy | SessionError::Store(_))) {
            self.derive_title(session_id, text).await;
        }

        result
    }

    async fn derive_title(&self, session_id: &str, text: &str) {
        let title = title_from_message(text);
        if let Err(e) = self.store.set_title_if_default(session_id, &title).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to set session title");
        }
    }

    /// Drop a session's history; waits for any in-flight turn
    pub async fn clear_messages(&self, session_id: &str) -> Result<SessionState, SessionError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let state = self.load_locked(session_id).await?;
        SessionExecutor::new(state, self.store.as_ref(), &self.turns)
            .run(Event::Clear)
            .await
    }

    /// Switch the model used for later turns; waits for any in-flight turn
    pub async fn update_model(&self, session_id: &str, model: &str) -> Result<SessionState, SessionError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(SessionError::InvalidModel);
        }

        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let state = self.load_locked(session_id).await?;
        SessionExecutor::new(state, self.store.as_ref(), &self.turns)
            .run(Event::UpdateModel {
                model: model.to_string(),
            })
            .await
    }

    // ==================== Session Index ====================

    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, SessionError> {
        Ok(self.store.list_sessions().await?)
    }

    /// Create a session, or retitle it if the id already exists.
    ///
    /// The title is the explicit one if given, else derived from
    /// `first_message`, else the default.
    pub async fn create_session(&self, params: NewSession) -> Result<SessionInfo, SessionError> {
        let session_id = params
            .session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let title = match (params.title, params.first_message) {
            (Some(title), _) if !title.trim().is_empty() => title.trim().to_string(),
            (_, Some(first)) if !first.trim().is_empty() => title_from_message(&first),
            _ => DEFAULT_TITLE.to_string(),
        };

        let info = self
            .store
            .create_session(&title, &self.fresh_state(&session_id))
            .await?;
        tracing::info!(session_id = %info.id, title = %info.title, "Session created");
        Ok(info)
    }

    /// Delete a session; waits for any in-flight turn
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let lock = self.session_lock(session_id).await;
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete_session(session_id).await?
        };
        self.locks.write().await.remove(session_id);
        Ok(deleted)
    }

    /// Delete every session; waits for all in-flight turns
    pub async fn delete_all_sessions(&self) -> Result<usize, SessionError> {
        // Holding the registry write lock keeps new turns from starting
        let mut locks = self.locks.write().await;
        let live: Vec<_> = locks.values().cloned().collect();
        let mut guards = Vec::with_capacity(live.len());
        for lock in &live {
            guards.push(lock.lock().await);
        }

        let deleted = self.store.delete_all_sessions().await?;
        drop(guards);
        locks.clear();

        tracing::info!(deleted, "All sessions deleted");
        Ok(deleted)
    }
}
