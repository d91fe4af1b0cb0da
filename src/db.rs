//! Database module for Clarity Chat
//!
//! Each session is one row: the index fields (title, timestamps) next to the
//! full `SessionState` stored as JSON.

mod schema;

pub use schema::*;

use crate::state_machine::SessionState;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt session state: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== State Operations ====================

    /// Load a session's state, `None` if the session was never saved
    pub fn load_state(&self, id: &str) -> DbResult<Option<SessionState>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row("SELECT state FROM sessions WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;

        json.map(|json| serde_json::from_str(&json).map_err(DbError::from))
            .transpose()
    }

    /// Load a session's state, first saving `initial` if the session is new.
    ///
    /// Never overwrites an existing row, so a concurrent save always wins.
    pub fn load_or_init(&self, initial: &SessionState) -> DbResult<SessionState> {
        let json = serde_json::to_string(initial)?;
        let now = Utc::now().timestamp_millis();

        self.conn()?.execute(
            "INSERT INTO sessions (id, title, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO NOTHING",
            params![initial.session_id, DEFAULT_TITLE, json, now],
        )?;

        Ok(self
            .load_state(&initial.session_id)?
            .unwrap_or_else(|| initial.clone()))
    }

    /// Save a session's state, creating its row if needed. Bumps `lastActive`.
    pub fn save_state(&self, state: &SessionState) -> DbResult<()> {
        let json = serde_json::to_string(state)?;
        let now = Utc::now().timestamp_millis();

        self.conn()?.execute(
            "INSERT INTO sessions (id, title, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            params![state.session_id, DEFAULT_TITLE, json, now],
        )?;
        Ok(())
    }

    /// Reset every session left mid-turn back to idle.
    ///
    /// Run once at startup; a crash during a turn leaves `isProcessing` set
    /// and the session would otherwise reject messages forever.
    pub fn reset_all_to_idle(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let rows: Vec<(String, String)> = {
            let mut stmt = conn.prepare("SELECT id, state FROM sessions")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut reset = 0;
        for (id, json) in rows {
            let mut state: SessionState = match serde_json::from_str(&json) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "Skipping unreadable session state");
                    continue;
                }
            };
            if !state.is_processing {
                continue;
            }
            state.is_processing = false;
            conn.execute(
                "UPDATE sessions SET state = ?1 WHERE id = ?2",
                params![serde_json::to_string(&state)?, id],
            )?;
            reset += 1;
        }
        Ok(reset)
    }

    // ==================== Session Index Operations ====================

    /// Get a session's index entry
    pub fn get_session(&self, id: &str) -> DbResult<Option<SessionInfo>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, title, created_at, updated_at FROM sessions WHERE id = ?1",
            params![id],
            row_to_info,
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Create a session with `initial` state, or retitle it if it exists
    pub fn create_session(&self, title: &str, initial: &SessionState) -> DbResult<SessionInfo> {
        let json = serde_json::to_string(initial)?;
        let now = Utc::now().timestamp_millis();

        self.conn()?.execute(
            "INSERT INTO sessions (id, title, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, updated_at = excluded.updated_at",
            params![initial.session_id, title, json, now],
        )?;

        self.get_session(&initial.session_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Set the title only while it is still the default. Returns whether it changed.
    pub fn set_title_if_default(&self, id: &str, title: &str) -> DbResult<bool> {
        let updated = self.conn()?.execute(
            "UPDATE sessions SET title = ?1 WHERE id = ?2 AND title = ?3",
            params![title, id, DEFAULT_TITLE],
        )?;
        Ok(updated > 0)
    }

    /// List sessions, most recently active first
    pub fn list_sessions(&self) -> DbResult<Vec<SessionInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM sessions
             ORDER BY updated_at DESC, created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_info)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Delete one session. Returns whether it existed.
    pub fn delete_session(&self, id: &str) -> DbResult<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Delete every session. Returns how many were removed.
    pub fn delete_all_sessions(&self) -> DbResult<usize> {
        let deleted = self.conn()?.execute("DELETE FROM sessions", [])?;
        Ok(deleted)
    }
}

fn row_to_info(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionInfo> {
    Ok(SessionInfo {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get(2)?,
        last_active: row.get(3)?,
    })
}
