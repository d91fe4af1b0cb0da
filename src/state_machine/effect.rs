//! Effects produced by state transitions

use super::state::Message;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist the new state
    PersistState,

    /// Run one turn through the turn processor
    RunTurn {
        text: String,
        /// History as it was before the user message was appended
        history: Vec<Message>,
        should_summarize: bool,
    },
}
