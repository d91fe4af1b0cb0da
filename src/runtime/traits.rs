//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the session manager with mock implementations.

use crate::db::{Database, DbError, SessionInfo};
use crate::llm::ToolDefinition;
use crate::state_machine::SessionState;
use crate::tools::{ToolOutput, ToolRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Storage for session state and the session index
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session's state, saving `initial` first if the session is new
    async fn load_or_init(&self, initial: &SessionState) -> Result<SessionState, DbError>;

    /// Save the full state (creates the session if needed)
    async fn save_state(&self, state: &SessionState) -> Result<(), DbError>;

    /// Create a session or retitle an existing one
    async fn create_session(&self, title: &str, initial: &SessionState) -> Result<SessionInfo, DbError>;

    /// Set the title while it is still the default
    async fn set_title_if_default(&self, session_id: &str, title: &str) -> Result<bool, DbError>;

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, DbError>;

    async fn delete_session(&self, session_id: &str) -> Result<bool, DbError>;

    async fn delete_all_sessions(&self) -> Result<usize, DbError>;
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a tool by name; `None` if the tool is unknown
    async fn execute(&self, name: &str, input: Value) -> Option<ToolOutput>;

    /// Get tool definitions for LLM
    fn definitions(&self) -> Vec<ToolDefinition>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn load_or_init(&self, initial: &SessionState) -> Result<SessionState, DbError> {
        (**self).load_or_init(initial).await
    }

    async fn save_state(&self, state: &SessionState) -> Result<(), DbError> {
        (**self).save_state(state).await
    }

    async fn create_session(&self, title: &str, initial: &SessionState) -> Result<SessionInfo, DbError> {
        (**self).create_session(title, initial).await
    }

    async fn set_title_if_default(&self, session_id: &str, title: &str) -> Result<bool, DbError> {
        (**self).set_title_if_default(session_id, title).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, DbError> {
        (**self).list_sessions().await
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, DbError> {
        (**self).delete_session(session_id).await
    }

    async fn delete_all_sessions(&self) -> Result<usize, DbError> {
        (**self).delete_all_sessions().await
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, name: &str, input: Value) -> Option<ToolOutput> {
        (**self).execute(name, input).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl SessionStore for Database {
    async fn load_or_init(&self, initial: &SessionState) -> Result<SessionState, DbError> {
        Database::load_or_init(self, initial)
    }

    async fn save_state(&self, state: &SessionState) -> Result<(), DbError> {
        Database::save_state(self, state)
    }

    async fn create_session(&self, title: &str, initial: &SessionState) -> Result<SessionInfo, DbError> {
        Database::create_session(self, title, initial)
    }

    async fn set_title_if_default(&self, session_id: &str, title: &str) -> Result<bool, DbError> {
        Database::set_title_if_default(self, session_id, title)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, DbError> {
        Database::list_sessions(self)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, DbError> {
        Database::delete_session(self, session_id)
    }

    async fn delete_all_sessions(&self) -> Result<usize, DbError> {
        Database::delete_all_sessions(self)
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, input: Value) -> Option<ToolOutput> {
        ToolRegistry::execute(self, name, input).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolRegistry::definitions(self)
    }
}
