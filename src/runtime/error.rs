//! Session-level errors and their user-facing messages

use super::turn::TurnError;
use crate::db::DbError;
use crate::llm::LlmErrorKind;
use crate::state_machine::TransitionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Message required")]
    EmptyMessage,
    #[error("A message is already being processed for this session.")]
    Busy,
    #[error("Invalid model")]
    InvalidModel,
    #[error("Turn failed: {0}")]
    Turn(#[from] TurnError),
    #[error("Store failure: {0}")]
    Store(#[from] DbError),
    #[error("Unexpected transition: {0}")]
    Transition(TransitionError),
}

impl From<TransitionError> for SessionError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::EmptyMessage => Self::EmptyMessage,
            TransitionError::Busy => Self::Busy,
            TransitionError::NotProcessing => Self::Transition(e),
        }
    }
}

impl SessionError {
    /// Message safe to show to the user. Upstream bodies never appear here.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyMessage | Self::Busy | Self::InvalidModel => self.to_string(),
            Self::Turn(TurnError::Upstream(e)) => match e.kind {
                LlmErrorKind::Auth => {
                    "AI authentication failed. Please check your API key and configuration."
                        .to_string()
                }
                LlmErrorKind::InvalidRequest => {
                    "The AI received an invalid request. Please try rephrasing your message."
                        .to_string()
                }
                LlmErrorKind::RateLimit => "AI rate limit reached. Please try again later.".to_string(),
                LlmErrorKind::Timeout => "The AI response timed out. Please try again.".to_string(),
                LlmErrorKind::Network | LlmErrorKind::ServerError | LlmErrorKind::Unknown => {
                    match e.status {
                        Some(status) => format!("AI Error ({status}): Please check the server logs."),
                        None => "Failed to process message".to_string(),
                    }
                }
            },
            Self::Turn(TurnError::EmptyResponse) => "Failed to process message".to_string(),
            Self::Store(_) | Self::Transition(_) => "Internal Server Error".to_string(),
        }
    }
}
