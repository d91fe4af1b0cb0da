//! Events that can occur in a session

use super::state::Message;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        /// The already-trimmed user message to append
        message: Message,
        /// Switches the session model before the turn runs
        model: Option<String>,
    },
    Clear,
    UpdateModel {
        model: String,
    },

    // Turn outcomes
    TurnCompleted {
        /// Assistant message produced by the turn
        message: Message,
        /// Whether this turn ran with the reflection trigger armed
        summarized: bool,
    },
    TurnFailed {
        reason: String,
    },
}
