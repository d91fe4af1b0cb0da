//! Database schema and types

use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT 'New Chat',
    state TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);
";

/// Title every session starts with until one is derived or chosen
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum characters kept when deriving a title from a message
pub const TITLE_MAX_CHARS: usize = 40;

/// Session index entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub title: String,
    /// Epoch milliseconds
    pub created_at: i64,
    /// Epoch milliseconds of the last save
    pub last_active: i64,
}

/// Derive a session title from the first user message
pub fn title_from_message(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", cut.trim_end())
}
