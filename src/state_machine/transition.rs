//! Pure state transition function
//!
//! Given the same state and event this always produces the same result; all
//! I/O happens in the executor while it runs the returned effects.

use super::{Effect, Event, SessionState};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Message required")]
    EmptyMessage,
    #[error("A message is already being processed for this session")]
    Busy,
    #[error("No turn is in flight for this session")]
    NotProcessing,
}

/// Pure transition function
pub fn transition(state: &SessionState, event: Event) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // User Message Handling
        // ============================================================
        Event::UserMessage { message, .. } if message.content.trim().is_empty() => {
            Err(TransitionError::EmptyMessage)
        }

        Event::UserMessage { .. } if state.is_processing => Err(TransitionError::Busy),

        // Idle + UserMessage -> Processing. The user message is recorded
        // before the model is called so failures still keep it.
        Event::UserMessage { message, model } => {
            let history = state.messages.clone();
            let text = message.content.clone();

            let mut new_state = state.clone();
            if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
                new_state.model = model;
            }
            new_state.messages.push(message);
            new_state.is_processing = true;

            let should_summarize = state.reflection_due(new_state.messages.len());

            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PersistState)
                .with_effect(Effect::RunTurn {
                    text,
                    history,
                    should_summarize,
                }))
        }

        // ============================================================
        // Turn Outcomes
        // ============================================================
        Event::TurnCompleted { message, summarized } => {
            if !state.is_processing {
                return Err(TransitionError::NotProcessing);
            }

            let mut new_state = state.clone();
            new_state.messages.push(message);
            new_state.is_processing = false;
            new_state.summary_offered = state.summary_offered || summarized;

            Ok(TransitionResult::new(new_state).with_effect(Effect::PersistState))
        }

        Event::TurnFailed { .. } => {
            if !state.is_processing {
                return Err(TransitionError::NotProcessing);
            }

            let mut new_state = state.clone();
            new_state.is_processing = false;

            Ok(TransitionResult::new(new_state).with_effect(Effect::PersistState))
        }

        // ============================================================
        // Session Maintenance
        // ============================================================
        Event::Clear => {
            let mut new_state = state.clone();
            new_state.messages.clear();
            new_state.summary_offered = false;
            new_state.is_processing = false;

            Ok(TransitionResult::new(new_state).with_effect(Effect::PersistState))
        }

        Event::UpdateModel { model } => {
            let mut new_state = state.clone();
            new_state.model = model;

            Ok(TransitionResult::new(new_state).with_effect(Effect::PersistState))
        }
    }
}
