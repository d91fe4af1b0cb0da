//! Session executor
//!
//! Drives one request through the pure state machine: apply the transition,
//! run its effects, feed any generated event back in. The executor owns the
//! working copy of the state for the duration of the request.

use super::error::SessionError;
use super::traits::SessionStore;
use super::turn::{TurnError, TurnProcessor};
use crate::db::DbError;
use crate::state_machine::{transition, Effect, Event, SessionState};

pub(super) struct SessionExecutor<'a> {
    state: SessionState,
    store: &'a dyn SessionStore,
    turns: &'a TurnProcessor,
    /// Set when the last turn failed; reported once the idle state is committed
    turn_error: Option<TurnError>,
}

impl<'a> SessionExecutor<'a> {
    pub(super) fn new(state: SessionState, store: &'a dyn SessionStore, turns: &'a TurnProcessor) -> Self {
        Self {
            state,
            store,
            turns,
            turn_error: None,
        }
    }

    /// Process an event and everything it chains into, returning the final state
    pub(super) async fn run(mut self, event: Event) -> Result<SessionState, SessionError> {
        self.process_event(event).await?;

        match self.turn_error.take() {
            Some(e) => Err(SessionError::Turn(e)),
            None => Ok(self.state),
        }
    }

    async fn process_event(&mut self, event: Event) -> Result<(), SessionError> {
        // Process in a loop rather than recursing on generated events
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let result = transition(&self.state, current_event)?;
            self.state = result.new_state;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    async fn execute_effect(&mut self, effect: Effect) -> Result<Option<Event>, SessionError> {
        match effect {
            Effect::PersistState => {
                self.persist().await?;
                Ok(None)
            }

            Effect::RunTurn {
                text,
                history,
                should_summarize,
            } => {
                tracing::info!(
                    session_id = %self.state.session_id,
                    model = %self.state.model,
                    history = history.len(),
                    should_summarize,
                    "Running turn"
                );

                let event = match self
                    .turns
                    .process_turn(&self.state.model, &text, &history, should_summarize)
                    .await
                {
                    Ok(output) => Event::TurnCompleted {
                        message: output.into_message(),
                        summarized: should_summarize,
                    },
                    Err(e) => {
                        tracing::error!(session_id = %self.state.session_id, error = %e, "Turn failed");
                        let reason = e.to_string();
                        self.turn_error = Some(e);
                        Event::TurnFailed { reason }
                    }
                };
                Ok(Some(event))
            }
        }
    }

    /// Save the working state. A failed commit of an idle state is retried
    /// once so a turn outcome does not leave the session marked processing.
    async fn persist(&self) -> Result<(), DbError> {
        match self.store.save_state(&self.state).await {
            Ok(()) => Ok(()),
            Err(e) if !self.state.is_processing => {
                tracing::warn!(session_id = %self.state.session_id, error = %e, "Retrying idle commit");
                self.store.save_state(&self.state).await
            }
            Err(e) => Err(e),
        }
    }
}
