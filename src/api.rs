//! HTTP API for Clarity Chat

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::config::Config;
use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, config: Config) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
        }
    }
}
